//! Item load / edit / add / remove tests

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crud_admin::{
        AdminClient, AdminConfig, AlertCategory, Fault, Filters, FormKind, ItemLookup, ItemPhase,
        ItemStatus, MemoryTransport, Method, Robot, StoreError, Store, ROBOT_API,
    };
    use serde_json::json;

    fn setup() -> (Arc<AdminClient>, Arc<MemoryTransport>) {
        let transport = Arc::new(MemoryTransport::demo());
        let store = Arc::new(Store::new(AdminConfig::default()));
        let client = Arc::new(AdminClient::new(store, transport.clone()));
        (client, transport)
    }

    fn last_alert(client: &AdminClient) -> (AlertCategory, String) {
        let alert = client
            .store()
            .alerts()
            .items()
            .pop()
            .expect("an alert was raised");
        (alert.category, alert.message)
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn load_item_fills_the_edit_form() {
        let (client, _) = setup();
        let found = client.load_item::<Robot>("r1").await.unwrap();
        let ItemLookup::Found(robot) = found else {
            panic!("expected r1 to load");
        };
        assert_eq!(robot.name, "Bender");

        let robots = &client.store().robots;
        assert_eq!(robots.item_status(), ItemStatus::Loaded);
        assert_eq!(robots.edit_form()["name"], json!("Bender"));
        assert_eq!(robots.edit_form()["assemblyDate"], json!("2996-09-04"));
        assert_eq!(robots.current_item(), Some(robot));
    }

    #[tokio::test]
    async fn cached_item_needs_no_request() {
        let (client, transport) = setup();
        client
            .fetch_index::<Robot>(Filters::new(), vec![], 0, 12)
            .await
            .unwrap();
        let sent = transport.requests().len();

        let found = client.load_item::<Robot>("r3").await.unwrap();
        assert!(matches!(found, ItemLookup::Found(ref r) if r.name == "Crushinator"));
        assert_eq!(transport.requests().len(), sent);
    }

    #[tokio::test]
    async fn unknown_item_is_missing_not_pending() {
        let (client, _) = setup();
        let lookup = client.load_item::<Robot>("ghost").await.unwrap();
        assert_eq!(lookup, ItemLookup::Missing);

        let robots = &client.store().robots;
        assert_eq!(robots.item_status(), ItemStatus::NotFound);
        assert_eq!(robots.item_lookup(), ItemLookup::Missing);
    }

    #[tokio::test]
    async fn item_is_pending_while_its_request_is_held() {
        let (client, transport) = setup();
        let gate = transport.gate_next();
        let c = client.clone();
        let task = tokio::spawn(async move { c.load_item::<Robot>("r2").await });
        while transport.requests().is_empty() {
            tokio::task::yield_now().await;
        }

        let robots = &client.store().robots;
        assert_eq!(robots.item_lookup(), ItemLookup::Pending);
        assert!(robots.have_pending_requests());

        gate.open();
        task.await.unwrap().unwrap();
        assert!(matches!(robots.item_lookup(), ItemLookup::Found(r) if r.id == "r2"));
    }

    #[tokio::test]
    async fn failed_load_records_the_error() {
        let (client, transport) = setup();
        transport.fail_next(Fault::Network("timeout".into()));
        let err = client.load_item::<Robot>("r1").await.unwrap_err();
        assert!(matches!(err, StoreError::Network(_)));
        assert!(matches!(
            client.store().robots.item_status(),
            ItemStatus::LoadFailed(_)
        ));
        assert_eq!(last_alert(&client).0, AlertCategory::Error);

        transport.fail_next(Fault::Status(503));
        let err = client.load_item::<Robot>("r1").await.unwrap_err();
        assert!(matches!(err, StoreError::Http(ref e) if e.status == 503));
    }

    #[tokio::test]
    async fn retry_after_failed_load_refills_from_cache() {
        let (client, transport) = setup();
        transport.fail_next(Fault::Network("timeout".into()));
        assert!(client.load_item::<Robot>("r1").await.is_err());

        client
            .fetch_index::<Robot>(Filters::new(), vec![], 0, 12)
            .await
            .unwrap();
        let lookup = client.load_item::<Robot>("r1").await.unwrap();
        assert!(matches!(lookup, ItemLookup::Found(_)));

        let robots = &client.store().robots;
        assert_eq!(robots.item_status(), ItemStatus::Loaded);
        assert_eq!(robots.edit_form()["name"], json!("Bender"));

        let saved = client.submit_edit::<Robot>().await.unwrap();
        assert_eq!(saved.name, "Bender");
    }

    #[tokio::test]
    async fn reselecting_a_cached_item_keeps_the_draft() {
        let (client, _) = setup();
        client.load_item::<Robot>("r1").await.unwrap();
        let robots = &client.store().robots;
        robots.update_edit_form("name", json!("Bender B."));

        client.load_item::<Robot>("r1").await.unwrap();
        assert_eq!(robots.edit_form()["name"], json!("Bender B."));
        assert_eq!(robots.item_status(), ItemStatus::Editing);
    }

    // -----------------------------------------------------------------------
    // Edit form
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn field_errors_block_submit_until_fixed() {
        let (client, transport) = setup();
        client.load_item::<Robot>("r1").await.unwrap();
        let robots = &client.store().robots;

        robots.update_edit_form("name", json!(""));
        assert!(client.validate_edit_form::<Robot>("name").is_err());
        assert_eq!(
            robots.edit_errors().get("name").map(String::as_str),
            Some("is required")
        );
        assert_eq!(robots.item_phase(), ItemPhase::EditingInvalid);

        let sent = transport.requests().len();
        let err = client.submit_edit::<Robot>().await.unwrap_err();
        assert!(matches!(err, StoreError::SubmitBlocked(1)));
        assert_eq!(transport.requests().len(), sent);

        robots.update_edit_form("name", json!("Bender II"));
        client.validate_edit_form::<Robot>("name").unwrap();
        assert!(robots.edit_errors().is_empty());
        assert_eq!(robots.item_phase(), ItemPhase::EditingValid);

        let saved = client.submit_edit::<Robot>().await.unwrap();
        assert_eq!(saved.name, "Bender II");
        assert_eq!(saved.manufacturer.as_deref(), Some("Mom's Friendly Robot Company"));

        let last = transport.requests().pop().unwrap();
        assert_eq!(last.method, Method::Patch);
        assert_eq!(last.url, ROBOT_API.item_url("r1"));
        assert_eq!(last.body.unwrap()["data"]["id"], json!("r1"));

        assert_eq!(robots.item_phase(), ItemPhase::SubmitSucceeded);
        assert_eq!(robots.cached("r1").unwrap().name, "Bender II");
        assert_eq!(robots.edit_form()["name"], json!("Bender II"));
        assert_eq!(
            last_alert(&client),
            (AlertCategory::Success, "Robot edited with id: r1".to_string())
        );
    }

    #[tokio::test]
    async fn failed_submit_keeps_the_draft() {
        let (client, transport) = setup();
        client.load_item::<Robot>("r4").await.unwrap();
        let robots = &client.store().robots;
        robots.update_edit_form("manufacturer", json!("Hedonism Ltd."));

        transport.fail_next(Fault::Status(500));
        let err = client.submit_edit::<Robot>().await.unwrap_err();
        assert!(matches!(err, StoreError::Http(_)));
        assert!(matches!(robots.item_status(), ItemStatus::SubmitFailed(_)));
        assert_eq!(robots.edit_form()["manufacturer"], json!("Hedonism Ltd."));
        assert_eq!(robots.cached("r4").unwrap().manufacturer.as_deref(), Some("Hedonism Inc."));

        let (category, message) = last_alert(&client);
        assert_eq!(category, AlertCategory::Error);
        assert_eq!(
            message,
            "Failed to edit Robot: PATCH /api/robots/r4 returned HTTP 500"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_changes_validate_once_with_the_last_value() {
        let (client, _) = setup();
        client.load_item::<Robot>("r1").await.unwrap();
        let robots = &client.store().robots;
        let before = robots.validation_runs();

        for value in ["Ben", "Be", ""] {
            client.change_field::<Robot>(FormKind::Edit, "name", json!(value));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(robots.validation_runs(), before);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(robots.validation_runs(), before + 1);
        assert_eq!(
            robots.edit_errors().get("name").map(String::as_str),
            Some("is required")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn blur_validates_immediately_and_cancels_pending_run() {
        let (client, _) = setup();
        client.load_item::<Robot>("r1").await.unwrap();
        let robots = &client.store().robots;
        let before = robots.validation_runs();

        client.change_field::<Robot>(FormKind::Edit, "assemblyDate", json!("someday"));
        assert!(client.blur_field::<Robot>(FormKind::Edit, "assemblyDate").is_err());
        assert_eq!(robots.validation_runs(), before + 1);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(robots.validation_runs(), before + 1);
        assert!(robots.edit_errors().contains_key("assemblyDate"));
    }

    // -----------------------------------------------------------------------
    // Add form
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn submit_add_creates_and_blanks_the_draft() {
        let (client, transport) = setup();
        client.load_index_page::<Robot>().await.unwrap();
        let robots = &client.store().robots;

        robots.update_add_form("name", json!("Wall-E"));
        robots.update_add_form("assemblyDate", json!("2805-04-22"));
        let created = client.submit_add::<Robot>().await.unwrap();

        assert_eq!(created.id, "new-1");
        assert_eq!(transport.record_count(ROBOT_API.index_url), 9);
        assert_eq!(robots.cached("new-1"), Some(created));
        assert_eq!(robots.add_form()["name"], json!(""));
        assert!(robots.ids().is_empty());
        assert_eq!(
            last_alert(&client),
            (AlertCategory::Success, "Robot added with id: new-1".to_string())
        );
    }

    #[tokio::test]
    async fn invalid_add_is_not_sent() {
        let (client, transport) = setup();
        let robots = &client.store().robots;
        robots.update_add_form("manufacturer", json!("Nobody"));

        let err = client.submit_add::<Robot>().await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(transport.requests().is_empty());
        assert!(robots.add_errors().contains_key("name"));
        assert!(!robots.can_submit(FormKind::Add));
        assert!(last_alert(&client).1.starts_with("Failed to add Robot:"));
    }

    // -----------------------------------------------------------------------
    // Remove
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn remove_drops_entity_and_index() {
        let (client, transport) = setup();
        client.load_index_page::<Robot>().await.unwrap();
        client.load_item::<Robot>("r1").await.unwrap();

        client.remove_item::<Robot>("r1").await.unwrap();

        let robots = &client.store().robots;
        assert_eq!(robots.cached("r1"), None);
        assert!(robots.ids().is_empty());
        assert_eq!(robots.total(), 0);
        assert_eq!(robots.item_status(), ItemStatus::NotFound);
        assert_eq!(transport.record_count(ROBOT_API.index_url), 7);
        assert_eq!(
            last_alert(&client),
            (AlertCategory::Success, "Robot removed with id: r1".to_string())
        );

        let items = client.load_index_page::<Robot>().await.unwrap();
        assert_eq!(items.len(), 7);
    }

    #[tokio::test]
    async fn failed_remove_changes_nothing() {
        let (client, _) = setup();
        client.load_index_page::<Robot>().await.unwrap();
        let ids = client.store().robots.ids();

        let err = client.remove_item::<Robot>("ghost").await.unwrap_err();
        assert!(matches!(err, StoreError::Http(ref e) if e.status == 404));
        assert_eq!(client.store().robots.ids(), ids);
        assert_eq!(last_alert(&client).0, AlertCategory::Error);
    }
}
