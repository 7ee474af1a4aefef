use argus_core::record::{FetchStatus, NewFetchRecord, Patch, RecordUpdate};
use argus_core::store::{FetchStore, RecordFilter};
use argus_db::FetchRepository;
use chrono::{TimeDelta, Utc};

use crate::integration::common::setup_test_db;

#[tokio::test]
async fn create_and_find_by_id() {
    let (pool, _container) = setup_test_db().await;
    let repo = FetchRepository::new(pool);

    let record = repo
        .create(NewFetchRecord::pending("https://example.com"))
        .await
        .unwrap();

    assert_eq!(record.url, "https://example.com");
    assert_eq!(record.status, FetchStatus::Pending);
    assert_eq!(record.retry_count, 0);
    assert!(record.content.is_none());
    assert!(record.redirect_chain.is_empty());

    let found = repo.find_by_id(record.id).await.unwrap().unwrap();
    assert_eq!(found.id, record.id);
    assert_eq!(found.url, "https://example.com");
}

#[tokio::test]
async fn find_by_url_matches_variants() {
    let (pool, _container) = setup_test_db().await;
    let repo = FetchRepository::new(pool);

    repo.create(NewFetchRecord::pending("https://example.com"))
        .await
        .unwrap();

    // Every surface form of the same host resolves to the stored row.
    for query in ["example.com", "www.example.com", "http://example.com"] {
        let found = repo.find_by_url(query).await.unwrap();
        assert!(found.is_some(), "query: {query}");
    }

    assert!(repo.find_by_url("https://other.com").await.unwrap().is_none());
}

#[tokio::test]
async fn update_applies_set_and_clear() {
    let (pool, _container) = setup_test_db().await;
    let repo = FetchRepository::new(pool);

    let record = repo
        .create(NewFetchRecord::pending("https://example.com"))
        .await
        .unwrap();

    let updated = repo
        .update(
            record.id,
            RecordUpdate {
                status: Some(FetchStatus::Success),
                content: Patch::Set("<html>OK</html>".into()),
                content_type: Patch::Set("text/html".into()),
                content_hash: Patch::Set(argus_core::compute_hash("<html>OK</html>")),
                http_status: Patch::Set(200),
                fetched_at: Patch::Set(Utc::now()),
                redirect_chain: Some(vec!["https://example.com".into()]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.status, FetchStatus::Success);
    assert_eq!(updated.content.as_deref(), Some("<html>OK</html>"));
    assert_eq!(updated.http_status, Some(200));
    assert_eq!(updated.redirect_chain, vec!["https://example.com".to_string()]);

    // Clearing nulls the field; untouched fields keep their value.
    let cleared = repo
        .update(
            record.id,
            RecordUpdate {
                content: Patch::Clear,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(cleared.content.is_none());
    assert_eq!(cleared.http_status, Some(200));
}

#[tokio::test]
async fn update_missing_record_is_not_found() {
    let (pool, _container) = setup_test_db().await;
    let repo = FetchRepository::new(pool);

    let err = repo
        .update(uuid::Uuid::new_v4(), RecordUpdate::default())
        .await
        .unwrap_err();
    assert!(matches!(err, argus_core::AppError::NotFound(_)));
}

#[tokio::test]
async fn get_recent_by_url_direct_and_active() {
    let (pool, _container) = setup_test_db().await;
    let repo = FetchRepository::new(pool);

    let record = repo
        .create(NewFetchRecord::pending("https://a.test"))
        .await
        .unwrap();

    // Active PENDING row within the window matches.
    let recent = repo
        .get_recent_by_url("https://a.test", TimeDelta::minutes(60))
        .await
        .unwrap();
    assert_eq!(recent.map(|r| r.id), Some(record.id));

    // SUCCESS with an old fetched_at does not match.
    repo.update(
        record.id,
        RecordUpdate {
            status: Some(FetchStatus::Success),
            content: Patch::Set("<x/>".into()),
            content_hash: Patch::Set(argus_core::compute_hash("<x/>")),
            fetched_at: Patch::Set(Utc::now() - TimeDelta::minutes(90)),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let recent = repo
        .get_recent_by_url("https://a.test", TimeDelta::minutes(60))
        .await
        .unwrap();
    assert!(recent.is_none(), "stale success is outside the window");
}

#[tokio::test]
async fn get_recent_by_url_matches_redirect_chain() {
    let (pool, _container) = setup_test_db().await;
    let repo = FetchRepository::new(pool);

    let record = repo
        .create(NewFetchRecord::pending("https://ynet.co.il"))
        .await
        .unwrap();
    repo.update(
        record.id,
        RecordUpdate {
            status: Some(FetchStatus::Success),
            content: Patch::Set("<html>news</html>".into()),
            content_hash: Patch::Set(argus_core::compute_hash("<html>news</html>")),
            fetched_at: Patch::Set(Utc::now()),
            final_url: Patch::Set("https://m.ynet.co.il".into()),
            redirect_chain: Some(vec![
                "https://ynet.co.il".into(),
                "https://m.ynet.co.il".into(),
            ]),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    // The redirect target dedups against the original scrape.
    let recent = repo
        .get_recent_by_url("m.ynet.co.il", TimeDelta::minutes(60))
        .await
        .unwrap();
    assert_eq!(recent.map(|r| r.id), Some(record.id));
}

#[tokio::test]
async fn find_all_filters_and_paginates() {
    let (pool, _container) = setup_test_db().await;
    let repo = FetchRepository::new(pool);

    for i in 0..5 {
        repo.create(NewFetchRecord::pending(format!("https://site{i}.test")))
            .await
            .unwrap();
    }

    let page = repo
        .find_all(RecordFilter::default(), 2, 0)
        .await
        .unwrap();
    assert_eq!(page.len(), 2);

    let rest = repo
        .find_all(RecordFilter::default(), 10, 2)
        .await
        .unwrap();
    assert_eq!(rest.len(), 3);

    let none = repo
        .find_all(
            RecordFilter {
                status: Some(FetchStatus::Success),
                ..Default::default()
            },
            10,
            0,
        )
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn find_stale_pending_honors_cutoff() {
    let (pool, _container) = setup_test_db().await;
    let repo = FetchRepository::new(pool.clone());

    let record = repo
        .create(NewFetchRecord::pending("https://stuck.test"))
        .await
        .unwrap();
    // Backdate creation past the timeout.
    sqlx::query("UPDATE fetch_records SET created_at = NOW() - INTERVAL '3 hours' WHERE id = $1")
        .bind(record.id)
        .execute(&pool)
        .await
        .unwrap();
    repo.create(NewFetchRecord::pending("https://fresh.test"))
        .await
        .unwrap();

    let stale = repo
        .find_stale_pending(TimeDelta::minutes(120))
        .await
        .unwrap();
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].id, record.id);
}

#[tokio::test]
async fn repair_clears_invariant_violations() {
    let (pool, _container) = setup_test_db().await;
    let repo = FetchRepository::new(pool.clone());

    let success = repo
        .create(NewFetchRecord::pending("https://ok.test"))
        .await
        .unwrap();
    let failed = repo
        .create(NewFetchRecord::pending("https://bad.test"))
        .await
        .unwrap();

    // Write contradictory rows directly, bypassing the repository.
    sqlx::query(
        "UPDATE fetch_records SET status = 'success', content = '<x/>', error_message = 'leftover' WHERE id = $1",
    )
    .bind(success.id)
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "UPDATE fetch_records SET status = 'failed', error_message = 'boom', content = '<x/>' WHERE id = $1",
    )
    .bind(failed.id)
    .execute(&pool)
    .await
    .unwrap();

    let fixed = repo.repair_inconsistencies().await.unwrap();
    assert_eq!(fixed, 2);

    let success = repo.find_by_id(success.id).await.unwrap().unwrap();
    assert!(success.error_message.is_none());
    assert!(success.content.is_some());

    let failed = repo.find_by_id(failed.id).await.unwrap().unwrap();
    assert!(failed.content.is_none());
    assert_eq!(failed.error_message.as_deref(), Some("boom"));

    assert_eq!(repo.repair_inconsistencies().await.unwrap(), 0);
}

#[tokio::test]
async fn history_is_newest_first() {
    let (pool, _container) = setup_test_db().await;
    let repo = FetchRepository::new(pool);

    let older = repo
        .create(NewFetchRecord::pending("https://a.test"))
        .await
        .unwrap();
    let newer = repo
        .create(NewFetchRecord::pending("https://a.test"))
        .await
        .unwrap();

    repo.update(
        older.id,
        RecordUpdate {
            status: Some(FetchStatus::Success),
            fetched_at: Patch::Set(Utc::now() - TimeDelta::minutes(30)),
            content: Patch::Set("<old/>".into()),
            content_hash: Patch::Set(argus_core::compute_hash("<old/>")),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    repo.update(
        newer.id,
        RecordUpdate {
            status: Some(FetchStatus::Success),
            fetched_at: Patch::Set(Utc::now()),
            content: Patch::Set("<new/>".into()),
            content_hash: Patch::Set(argus_core::compute_hash("<new/>")),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let history = repo.get_history("a.test").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, newer.id);
    assert_eq!(history[1].id, older.id);
}
