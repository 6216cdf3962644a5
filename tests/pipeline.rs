//! Library-level build and search over generated datasets.

mod common;

use std::path::Path;

use archdex::config::Config;
use archdex::pipeline::build_index;
use archdex::sqlite_index::{IndexState, SqliteIndex};
use archdex_core::batch::NoProgress;
use archdex_core::query::{search, FacetBucket, FacetRequest, SearchRequest};
use archdex_core::schema::accession_schema;
use archdex_core::store::memory::InMemoryIndex;
use archdex_core::store::SearchIndex;
use tempfile::TempDir;

fn config_for(root: &Path, batch_size: usize) -> Config {
    let mut config = Config::default();
    config.dataset.root = root.to_path_buf();
    config.index.path = root.join("test.archdex");
    config.index.batch_size = batch_size;
    config
}

#[tokio::test]
async fn batches_are_ceiling_of_document_count() {
    let tmp = TempDir::new().unwrap();
    common::write_bulk_dataset(tmp.path(), 250);

    let index = InMemoryIndex::new(accession_schema());
    let summary = build_index(&config_for(tmp.path(), 100), &index, &NoProgress)
        .await
        .unwrap();

    assert_eq!(index.batch_sizes(), vec![100, 100, 50]);
    assert_eq!(summary.documents, 250);
    assert_eq!(summary.batches, 3);
    assert_eq!(summary.accessions_read, 250);
}

#[tokio::test]
async fn sample_dataset_counts_and_resolution() {
    let tmp = TempDir::new().unwrap();
    common::write_dataset(tmp.path());

    let index = InMemoryIndex::new(accession_schema());
    let summary = build_index(&config_for(tmp.path(), 2), &index, &NoProgress)
        .await
        .unwrap();

    assert_eq!(summary.accessions_read, 4);
    assert_eq!(summary.skipped_files, 1);
    assert_eq!(summary.filtered, 1);
    assert_eq!(summary.unresolved_refs, 1);
    assert_eq!(summary.documents, 3);
    assert_eq!(index.batch_sizes(), vec![2, 1]);

    let hale = index.get("/repositories/2/accessions/1").unwrap();
    assert_eq!(hale.identifier.as_deref(), Some("2001-004"));
    assert_eq!(hale.subjects, vec!["Solar eclipses", "Astronomy"]);
    assert_eq!(hale.linked_agents_creators, vec!["Hale, George Ellery"]);
    assert_eq!(hale.digital_object_titles, vec!["Eclipse photographs"]);
    assert_eq!(
        hale.digital_object_file_uris,
        vec!["https://example.org/eclipse.jpg"]
    );
    assert_eq!(hale.extents, vec!["2 linear feet"]);

    let records = index.get("/repositories/2/accessions/2").unwrap();
    assert_eq!(records.subjects, vec!["Astronomy", "Fundraising"]);
    assert_eq!(records.subjects_function, vec!["Fundraising"]);
    assert_eq!(records.unresolved_refs, vec!["/subjects/99"]);

    assert!(index.get("/repositories/2/accessions/4").is_none());
}

#[tokio::test]
async fn unpublished_accessions_can_be_skipped() {
    let tmp = TempDir::new().unwrap();
    common::write_dataset(tmp.path());

    let mut config = config_for(tmp.path(), 10);
    config.index.skip_unpublished = true;

    let index = InMemoryIndex::new(accession_schema());
    let summary = build_index(&config, &index, &NoProgress).await.unwrap();
    assert_eq!(summary.filtered, 2);
    assert_eq!(summary.documents, 2);
    assert!(index.get("/repositories/2/accessions/3").is_none());
}

#[tokio::test]
async fn sqlite_build_is_idempotent_and_searchable() {
    let tmp = TempDir::new().unwrap();
    common::write_dataset(tmp.path());
    let config = config_for(tmp.path(), 100);

    let (index, state) = SqliteIndex::open_or_create(&config.index.path, &accession_schema())
        .await
        .unwrap();
    assert_eq!(state, IndexState::Created);
    build_index(&config, &index, &NoProgress).await.unwrap();
    build_index(&config, &index, &NoProgress).await.unwrap();
    assert_eq!(index.document_count().await.unwrap(), 3);

    let mut req = SearchRequest::new("eclipse");
    req.highlight_fields = vec!["content_description".into()];
    req.facet = Some(FacetRequest {
        field: "subjects".into(),
        top_n: 3,
    });
    let result = search(&index, &req).await.unwrap();

    assert_eq!(result.total_hits, 2);
    let mut ids: Vec<&str> = result.hits.iter().map(|h| h.id.as_str()).collect();
    ids.sort();
    assert_eq!(
        ids,
        vec!["/repositories/2/accessions/1", "/repositories/2/accessions/3"]
    );

    let facet = result.facet.unwrap();
    assert_eq!(
        facet.buckets,
        vec![
            FacetBucket {
                value: "Solar eclipses".into(),
                count: 2
            },
            FacetBucket {
                value: "Astronomy".into(),
                count: 1
            },
        ]
    );
    assert_eq!(facet.total, 3);
    assert_eq!(facet.missing, 0);

    let lick = result
        .hits
        .iter()
        .find(|h| h.id.ends_with("/3"))
        .unwrap();
    assert!(lick.fragments["content_description"][0].contains("<mark>eclipse</mark>"));

    index.close().await;
}

#[tokio::test]
async fn window_is_clamped_and_total_is_unwindowed() {
    let tmp = TempDir::new().unwrap();
    common::write_bulk_dataset(tmp.path(), 30);
    let config = config_for(tmp.path(), 1000);

    let (index, _) = SqliteIndex::open_or_create(&config.index.path, &accession_schema())
        .await
        .unwrap();
    build_index(&config, &index, &NoProgress).await.unwrap();

    let mut req = SearchRequest::new("letters");
    req.offset = -5;
    req.limit = 0;
    let result = search(&index, &req).await.unwrap();
    assert_eq!(result.offset, 0);
    assert_eq!(result.limit, 10);
    assert_eq!(result.hits.len(), 10);
    assert_eq!(result.total_hits, 30);

    req.offset = 25;
    req.limit = 10;
    let tail = search(&index, &req).await.unwrap();
    assert_eq!(tail.hits.len(), 5);
    assert_eq!(tail.total_hits, 30);

    index.close().await;
}

#[tokio::test]
async fn missing_dataset_directory_fails_the_build() {
    let tmp = TempDir::new().unwrap();
    let index = InMemoryIndex::new(accession_schema());
    let err = build_index(&config_for(&tmp.path().join("absent"), 10), &index, &NoProgress)
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("subject"));
    assert!(index.batch_sizes().is_empty());
}
