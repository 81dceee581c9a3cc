mod common;

use std::sync::Arc;

use briefcase_core::storage::{BlobStore, MemoryBlobStore};
use briefcase_core::sync::CancelToken;
use briefcase_core::transport::{HttpMethod, TransportResponse};
use briefcase_core::Error;
use common::*;
use pretty_assertions::assert_eq;

const MIRROR: &str = "alice/briefcase/forms";

/// One form with a logo, two submissions over two pages, one with a photo.
fn household_server() -> Arc<FakeServer> {
    let server = FakeServer::new();
    let logo = format!("{BASE}media/logo.png");
    let photo = format!("{BASE}view/binaryData?blobKey=photo-1");

    server.get(
        &form_list_url(),
        200,
        &form_list(&[xform_entry("household", "Household", true)]),
    );
    server.get(
        &download_url("household"),
        200,
        &form_definition("household", "Household survey"),
    );
    server.get(
        &manifest_url("household"),
        200,
        &manifest(&[("logo.png", &logo)]),
    );
    server.media(&logo, "LOGO");

    server.get(
        &submission_list_url("household", "0"),
        200,
        &id_chunk(&["uuid:1"], Some("1")),
    );
    server.get(
        &submission_list_url("household", "1"),
        200,
        &id_chunk(&["uuid:2"], Some("1")),
    );
    server.get(
        &submission_url("household", "uuid:1"),
        200,
        &submission("household", "uuid:1", "Ada", &[("photo.jpg", &photo)]),
    );
    server.get(
        &submission_url("household", "uuid:2"),
        200,
        &submission("household", "uuid:2", "Grace", &[]),
    );
    server.media(&photo, "PHOTO");
    server
}

#[tokio::test(start_paused = true)]
async fn pull_mirrors_forms_media_and_instances() {
    let server = household_server();
    let blobs = Arc::new(MemoryBlobStore::new());

    let report = client(&server, &blobs).pull(true).await.unwrap();

    assert_eq!(
        blobs
            .paths()
            .iter()
            .map(|path| path.display().to_string())
            .collect::<Vec<_>>(),
        vec![
            format!("{MIRROR}/household/form-media/logo.png"),
            format!("{MIRROR}/household/household.xml"),
            format!("{MIRROR}/household/instances/uuid1/photo.jpg"),
            format!("{MIRROR}/household/instances/uuid1/submission.xml"),
            format!("{MIRROR}/household/instances/uuid2/submission.xml"),
        ]
    );

    let definition = read_blob(&blobs, &format!("{MIRROR}/household/household.xml")).await;
    assert_eq!(definition, form_definition("household", "Household survey").trim());
    let stored = read_blob(
        &blobs,
        &format!("{MIRROR}/household/instances/uuid1/submission.xml"),
    )
    .await;
    assert!(stored.starts_with("<submission"));
    assert_eq!(
        read_blob(&blobs, &format!("{MIRROR}/household/instances/uuid1/photo.jpg")).await,
        "PHOTO"
    );

    assert_eq!(report.forms_listed, 1);
    assert_eq!(report.forms_downloaded, 1);
    assert_eq!(report.media_downloaded, 2);
    assert_eq!(report.instances_downloaded, 2);
    assert_eq!(report.submission_pages, 2);
    assert!(!report.has_failures(), "{:?}", report.failures);
}

#[tokio::test(start_paused = true)]
async fn second_pull_downloads_nothing_new() {
    let server = household_server();
    let blobs = Arc::new(MemoryBlobStore::new());
    let sync = client(&server, &blobs);

    sync.pull(true).await.unwrap();
    server.clear_requests();
    let report = sync.pull(true).await.unwrap();

    assert_eq!(server.count(HttpMethod::Get, &download_url("household")), 0);
    assert_eq!(
        server.count_prefix(HttpMethod::Get, &format!("{BASE}view/downloadSubmission")),
        0
    );
    assert!(server.urls(HttpMethod::Head).is_empty());
    assert_eq!(server.count_prefix(HttpMethod::Get, &format!("{BASE}media/")), 0);
    assert_eq!(
        server.count_prefix(HttpMethod::Get, &format!("{BASE}view/binaryData")),
        0
    );

    assert_eq!(report.forms_cached, 1);
    assert_eq!(report.instances_cached, 2);
    assert_eq!(report.media_cached, 2);
    assert_eq!(report.forms_downloaded + report.instances_downloaded + report.media_downloaded, 0);
}

#[tokio::test(start_paused = true)]
async fn unchanged_cursor_ends_walk_after_two_requests() {
    let server = FakeServer::new();
    server.get(
        &form_list_url(),
        200,
        &form_list(&[xform_entry("stuck", "Stuck", false)]),
    );
    server.get(&download_url("stuck"), 200, &form_definition("stuck", "Stuck"));
    server.get(&submission_list_url("stuck", "0"), 200, &id_chunk(&[], Some("5")));
    server.get(&submission_list_url("stuck", "5"), 200, &id_chunk(&[], Some("5")));
    let blobs = Arc::new(MemoryBlobStore::new());

    let report = client(&server, &blobs).pull(true).await.unwrap();

    assert_eq!(
        server.count_prefix(HttpMethod::Get, &format!("{BASE}view/submissionList")),
        2
    );
    assert_eq!(report.submission_pages, 2);
}

#[tokio::test(start_paused = true)]
async fn cursor_cycle_ends_walk() {
    let server = FakeServer::new();
    server.get(
        &form_list_url(),
        200,
        &form_list(&[xform_entry("loop", "Loop", false)]),
    );
    server.get(&download_url("loop"), 200, &form_definition("loop", "Loop"));
    server.get(&submission_list_url("loop", "0"), 200, &id_chunk(&[], Some("a")));
    server.get(&submission_list_url("loop", "a"), 200, &id_chunk(&[], Some("b")));
    server.get(&submission_list_url("loop", "b"), 200, &id_chunk(&[], Some("a")));
    let blobs = Arc::new(MemoryBlobStore::new());

    client(&server, &blobs).pull(true).await.unwrap();

    assert_eq!(
        server.count_prefix(HttpMethod::Get, &format!("{BASE}view/submissionList")),
        3
    );
}

#[tokio::test(start_paused = true)]
async fn missing_cursor_ends_walk() {
    let server = FakeServer::new();
    server.get(
        &form_list_url(),
        200,
        &form_list(&[xform_entry("once", "Once", false)]),
    );
    server.get(&download_url("once"), 200, &form_definition("once", "Once"));
    server.get(&submission_list_url("once", "0"), 200, &id_chunk(&[], None));
    let blobs = Arc::new(MemoryBlobStore::new());

    client(&server, &blobs).pull(true).await.unwrap();

    assert_eq!(
        server.count_prefix(HttpMethod::Get, &format!("{BASE}view/submissionList")),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn media_redirect_is_fetched_without_credentials() {
    let server = FakeServer::new();
    let media = format!("{BASE}media/map.png");
    let signed = "https://s3.example.com/bucket/map.png?signature=abc";
    server.get(
        &form_list_url(),
        200,
        &form_list(&[xform_entry("survey", "Survey", true)]),
    );
    server.get(&download_url("survey"), 200, &form_definition("survey", "Survey"));
    server.get(&manifest_url("survey"), 200, &manifest(&[("map.png", &media)]));
    server.head(&media, TransportResponse::redirect(302, signed));
    server.get(signed, 200, "MAP");
    let blobs = Arc::new(MemoryBlobStore::new());

    client(&server, &blobs).pull(false).await.unwrap();

    let requests = server.requests();
    let redirected: Vec<_> = requests
        .iter()
        .filter(|request| request.url == signed)
        .collect();
    assert_eq!(redirected.len(), 1);
    assert_eq!(redirected[0].method, HttpMethod::Get);
    assert!(!redirected[0].authenticated);
    assert_eq!(server.count(HttpMethod::Get, &media), 0);
    assert_eq!(
        read_blob(&blobs, &format!("{MIRROR}/survey/form-media/map.png")).await,
        "MAP"
    );

    // Every request to the server itself stays authenticated.
    assert!(requests
        .iter()
        .filter(|request| request.url.starts_with(BASE))
        .all(|request| request.authenticated));
}

#[tokio::test(start_paused = true)]
async fn malformed_manifest_keeps_definition_and_moves_on() {
    let server = FakeServer::new();
    let good_media = format!("{BASE}media/good.png");
    server.get(
        &form_list_url(),
        200,
        &form_list(&[
            xform_entry("broken", "Broken", true),
            xform_entry("good", "Good", true),
        ]),
    );
    server.get(&download_url("broken"), 200, &form_definition("broken", "Broken"));
    server.get(&manifest_url("broken"), 200, "<manifest><mediaFile>");
    server.get(&download_url("good"), 200, &form_definition("good", "Good"));
    server.get(&manifest_url("good"), 200, &manifest(&[("good.png", &good_media)]));
    server.media(&good_media, "GOOD");
    server.get(&submission_list_url("good", "0"), 200, &id_chunk(&[], None));
    let blobs = Arc::new(MemoryBlobStore::new());

    let report = client(&server, &blobs).pull(true).await.unwrap();

    assert!(blobs
        .exists(std::path::Path::new(&format!("{MIRROR}/broken/broken.xml")))
        .await
        .unwrap());
    let broken_media = blobs
        .list_dir(std::path::Path::new(&format!("{MIRROR}/broken/form-media")))
        .await
        .unwrap();
    assert!(broken_media.files.is_empty());
    assert!(blobs
        .exists(std::path::Path::new(&format!("{MIRROR}/good/form-media/good.png")))
        .await
        .unwrap());

    // Instances of the broken form are skipped too.
    assert_eq!(
        server.count_prefix(
            HttpMethod::Get,
            &format!("{BASE}view/submissionList?formId=broken")
        ),
        0
    );
    assert_eq!(report.manifests_skipped, 1);
    assert_eq!(report.forms_downloaded, 2);
}

#[tokio::test(start_paused = true)]
async fn reserved_category_forms_are_not_pulled() {
    let server = FakeServer::new();
    server.get(
        &form_list_url(),
        200,
        &form_list(&[
            xform_entry("crowd_poll", "Crowd/Poll", false),
            xform_entry("census", "Census", false),
        ]),
    );
    server.get(&download_url("census"), 200, &form_definition("census", "Census"));
    let blobs = Arc::new(MemoryBlobStore::new());

    let report = client(&server, &blobs).pull(false).await.unwrap();

    assert_eq!(server.count(HttpMethod::Get, &download_url("crowd_poll")), 0);
    assert_eq!(report.forms_excluded, 1);
    assert_eq!(report.forms_downloaded, 1);
}

#[tokio::test(start_paused = true)]
async fn excluded_prefix_is_configurable() {
    let server = FakeServer::new();
    server.get(
        &form_list_url(),
        200,
        &form_list(&[xform_entry("crowd_poll", "Crowd/Poll", false)]),
    );
    server.get(&download_url("crowd_poll"), 200, &form_definition("crowd_poll", "Poll"));
    let blobs = Arc::new(MemoryBlobStore::new());

    let report = client(&server, &blobs)
        .with_excluded_prefix("")
        .pull(false)
        .await
        .unwrap();

    assert_eq!(report.forms_excluded, 0);
    assert_eq!(report.forms_downloaded, 1);
}

#[tokio::test(start_paused = true)]
async fn failing_media_file_does_not_stop_the_batch() {
    let server = FakeServer::new();
    let bad = format!("{BASE}media/bad.png");
    let good = format!("{BASE}media/good.png");
    server.get(
        &form_list_url(),
        200,
        &form_list(&[xform_entry("survey", "Survey", true)]),
    );
    server.get(&download_url("survey"), 200, &form_definition("survey", "Survey"));
    server.get(
        &manifest_url("survey"),
        200,
        &manifest(&[("bad.png", &bad), ("good.png", &good)]),
    );
    server.head(&bad, TransportResponse::new(200, ""));
    server.get(&bad, 500, "boom");
    server.media(&good, "GOOD");
    let blobs = Arc::new(MemoryBlobStore::new());

    let report = client(&server, &blobs).pull(false).await.unwrap();

    // One attempt plus two retries.
    assert_eq!(server.count(HttpMethod::Get, &bad), 3);
    assert_eq!(report.media_downloaded, 1);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].resource.ends_with("bad.png"));
    assert!(!blobs
        .exists(std::path::Path::new(&format!("{MIRROR}/survey/form-media/bad.png")))
        .await
        .unwrap());
}

#[tokio::test(start_paused = true)]
async fn transient_failure_is_retried_until_success() {
    let server = FakeServer::new();
    server.get(
        &form_list_url(),
        200,
        &form_list(&[xform_entry("flaky", "Flaky", false)]),
    );
    server.route(
        HttpMethod::Get,
        &download_url("flaky"),
        vec![
            Reply::ConnectionError,
            Reply::Respond(TransportResponse::new(503, "busy")),
            Reply::Respond(TransportResponse::new(200, form_definition("flaky", "Flaky"))),
        ],
    );
    let blobs = Arc::new(MemoryBlobStore::new());

    let started = tokio::time::Instant::now();
    let report = client(&server, &blobs).pull(false).await.unwrap();

    assert_eq!(server.count(HttpMethod::Get, &download_url("flaky")), 3);
    assert_eq!(report.forms_downloaded, 1);
    // Delays of 1s then 2s between the three attempts.
    assert_eq!(started.elapsed(), std::time::Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn exhausted_form_download_is_skipped_without_writing() {
    let server = FakeServer::new();
    server.get(
        &form_list_url(),
        200,
        &form_list(&[
            xform_entry("down", "Down", true),
            xform_entry("up", "Up", false),
        ]),
    );
    server.get(&download_url("down"), 500, "");
    server.get(&download_url("up"), 200, &form_definition("up", "Up"));
    let blobs = Arc::new(MemoryBlobStore::new());

    let report = client(&server, &blobs).pull(false).await.unwrap();

    assert_eq!(server.count(HttpMethod::Get, &manifest_url("down")), 0);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].resource, "down");
    assert_eq!(
        blobs.paths(),
        vec![std::path::PathBuf::from(format!("{MIRROR}/up/up.xml"))]
    );
}

#[tokio::test(start_paused = true)]
async fn unreachable_form_list_fails_the_run() {
    let server = FakeServer::new();
    server.get(&form_list_url(), 503, "maintenance");
    let blobs = Arc::new(MemoryBlobStore::new());

    let result = client(&server, &blobs).pull(true).await;

    assert!(matches!(result, Err(Error::Transport(_))));
    assert!(blobs.paths().is_empty());
}

#[tokio::test(start_paused = true)]
async fn malformed_submission_page_ends_only_that_form() {
    let server = FakeServer::new();
    server.get(
        &form_list_url(),
        200,
        &form_list(&[
            xform_entry("first", "First", false),
            xform_entry("second", "Second", false),
        ]),
    );
    server.get(&download_url("first"), 200, &form_definition("first", "First"));
    server.get(&download_url("second"), 200, &form_definition("second", "Second"));
    server.get(&submission_list_url("first", "0"), 200, "<idChunk><idList>");
    server.get(
        &submission_list_url("second", "0"),
        200,
        &id_chunk(&["uuid:9"], None),
    );
    server.get(
        &submission_url("second", "uuid:9"),
        200,
        &submission("second", "uuid:9", "Zed", &[]),
    );
    let blobs = Arc::new(MemoryBlobStore::new());

    let report = client(&server, &blobs).pull(true).await.unwrap();

    assert_eq!(report.instances_downloaded, 1);
    assert_eq!(report.failures.len(), 1);
    assert!(blobs
        .exists(std::path::Path::new(&format!(
            "{MIRROR}/second/instances/uuid9/submission.xml"
        )))
        .await
        .unwrap());
}

#[tokio::test(start_paused = true)]
async fn unsafe_names_from_server_are_skipped() {
    let server = FakeServer::new();
    let evil = format!("{BASE}media/evil");
    let fine = format!("{BASE}media/fine.png");
    server.get(
        &form_list_url(),
        200,
        &form_list(&[
            xform_entry("..", "Escape", false),
            xform_entry("safe", "Safe", true),
        ]),
    );
    server.get(&download_url("safe"), 200, &form_definition("safe", "Safe"));
    server.get(
        &manifest_url("safe"),
        200,
        &manifest(&[("../../evil.sh", &evil), ("fine.png", &fine)]),
    );
    server.media(&evil, "EVIL");
    server.media(&fine, "FINE");
    let blobs = Arc::new(MemoryBlobStore::new());

    let report = client(&server, &blobs).pull(false).await.unwrap();

    assert_eq!(server.count(HttpMethod::Get, &download_url("..")), 0);
    assert_eq!(server.count(HttpMethod::Get, &evil), 0);
    assert_eq!(report.failures.len(), 2);
    assert_eq!(
        blobs.paths(),
        vec![
            std::path::PathBuf::from(format!("{MIRROR}/safe/form-media/fine.png")),
            std::path::PathBuf::from(format!("{MIRROR}/safe/safe.xml")),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn concurrent_media_fetch_downloads_each_file_once() {
    let server = FakeServer::new();
    let files: Vec<(String, String)> = (0..6)
        .map(|index| (format!("file{index}.png"), format!("{BASE}media/file{index}.png")))
        .collect();
    let mut entries: Vec<(&str, &str)> = files
        .iter()
        .map(|(name, url)| (name.as_str(), url.as_str()))
        .collect();
    // Same filename listed twice.
    entries.push((files[0].0.as_str(), files[0].1.as_str()));

    server.get(
        &form_list_url(),
        200,
        &form_list(&[xform_entry("gallery", "Gallery", true)]),
    );
    server.get(&download_url("gallery"), 200, &form_definition("gallery", "Gallery"));
    server.get(&manifest_url("gallery"), 200, &manifest(&entries));
    for (name, url) in &files {
        server.media(url, name);
    }
    let blobs = Arc::new(MemoryBlobStore::new());

    let report = client(&server, &blobs)
        .with_media_concurrency(3)
        .unwrap()
        .pull(false)
        .await
        .unwrap();

    assert_eq!(report.media_downloaded, 6);
    assert_eq!(server.count(HttpMethod::Get, &files[0].1), 1);
    for (name, _) in &files {
        assert_eq!(
            read_blob(&blobs, &format!("{MIRROR}/gallery/form-media/{name}")).await,
            *name
        );
    }
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_between_forms() {
    let server = FakeServer::new();
    server.get(
        &form_list_url(),
        200,
        &form_list(&[
            xform_entry("first", "First", false),
            xform_entry("second", "Second", false),
        ]),
    );
    server.get(&download_url("first"), 200, &form_definition("first", "First"));
    server.get(&download_url("second"), 200, &form_definition("second", "Second"));
    let token = CancelToken::new();
    server.cancel_when_requested(&download_url("first"), token.clone());
    let blobs = Arc::new(MemoryBlobStore::new());

    let result = client(&server, &blobs)
        .with_cancel_token(token)
        .pull(false)
        .await;

    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(server.count(HttpMethod::Get, &download_url("second")), 0);
    // The form being fetched when cancellation arrived is complete.
    assert_eq!(
        read_blob(&blobs, &format!("{MIRROR}/first/first.xml")).await,
        form_definition("first", "First").trim()
    );
}

#[tokio::test(start_paused = true)]
async fn pull_into_local_store_writes_no_partial_files() {
    let server = household_server();
    let tmp = tempfile::tempdir().unwrap();
    let blobs = Arc::new(briefcase_core::storage::LocalBlobStore::new(tmp.path()));
    let sync = briefcase_core::SyncClient::new(
        server.clone(),
        blobs,
        layout(),
        briefcase_core::transport::ServerEndpoints::new(BASE).unwrap(),
    )
    .with_retry(fast_retry());

    sync.pull(true).await.unwrap();

    let instance_dir = tmp.path().join(MIRROR).join("household/instances/uuid1");
    let mut names: Vec<String> = std::fs::read_dir(&instance_dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["photo.jpg", "submission.xml"]);
}
