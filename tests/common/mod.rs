#![allow(dead_code)]

use serde_json::{json, Value};
use std::fs;
use std::path::Path;

fn write_json(path: &Path, value: &Value) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

/// A small export: three subjects, one agent, one digital object and five
/// accession files in repository 2 (one broken, one suppressed, one
/// unpublished, one with a dangling subject reference).
pub fn write_dataset(root: &Path) {
    let subjects = root.join("subjects");
    write_json(
        &subjects.join("1.json"),
        &json!({
            "uri": "/subjects/1",
            "title": "Solar eclipses",
            "terms": [{"term": "Solar eclipses", "term_type": "topical"}]
        }),
    );
    write_json(
        &subjects.join("2.json"),
        &json!({
            "uri": "/subjects/2",
            "title": "Astronomy",
            "terms": [{"term": "Astronomy", "term_type": "topical"}]
        }),
    );
    write_json(
        &subjects.join("3.json"),
        &json!({
            "uri": "/subjects/3",
            "title": "Fundraising",
            "terms": [{"term": "Fundraising", "term_type": "function"}]
        }),
    );

    write_json(
        &root.join("agents/people/1.json"),
        &json!({
            "uri": "/agents/people/1",
            "display_name": {"sort_name": "Hale, George Ellery"}
        }),
    );

    let repo = root.join("repositories/2");
    write_json(
        &repo.join("digital_objects/1.json"),
        &json!({
            "uri": "/repositories/2/digital_objects/1",
            "title": "Eclipse photographs",
            "file_versions": [{"file_uri": "https://example.org/eclipse.jpg", "publish": true}]
        }),
    );

    let accessions = repo.join("accessions");
    write_json(
        &accessions.join("1.json"),
        &json!({
            "uri": "/repositories/2/accessions/1",
            "title": "George Ellery Hale papers",
            "id_0": "2001",
            "id_1": "004",
            "content_description": "Correspondence and photographs of solar eclipses observed at Mount Wilson.",
            "publish": true,
            "subjects": [{"ref": "/subjects/1"}, {"ref": "/subjects/2"}],
            "linked_agents": [{"ref": "/agents/people/1", "role": "creator"}],
            "digital_objects": [{"ref": "/repositories/2/digital_objects/1"}],
            "extents": [{"number": "2", "extent_type": "linear_feet"}]
        }),
    );
    write_json(
        &accessions.join("2.json"),
        &json!({
            "uri": "/repositories/2/accessions/2",
            "title": "Mount Wilson Observatory records",
            "content_description": "Administrative records, budgets and staff correspondence.",
            "publish": true,
            "subjects": ["/subjects/2", "/subjects/3", "/subjects/99"]
        }),
    );
    write_json(
        &accessions.join("3.json"),
        &json!({
            "uri": "/repositories/2/accessions/3",
            "title": "Lick expedition notebooks",
            "content_description": "Field notebooks from the solar eclipse expedition of 1918.",
            "publish": false,
            "subjects": ["/subjects/1"]
        }),
    );
    write_json(
        &accessions.join("4.json"),
        &json!({
            "uri": "/repositories/2/accessions/4",
            "title": "Restricted donor file",
            "content_description": "Eclipse donor correspondence.",
            "publish": true,
            "suppressed": true
        }),
    );
    fs::write(accessions.join("5.json"), "{ \"uri\": ").unwrap();
}

/// `n` minimal accessions in repository 2 with an empty subject directory.
pub fn write_bulk_dataset(root: &Path, n: usize) {
    fs::create_dir_all(root.join("subjects")).unwrap();
    let accessions = root.join("repositories/2/accessions");
    for i in 0..n {
        write_json(
            &accessions.join(format!("{:05}.json", i)),
            &json!({
                "uri": format!("/repositories/2/accessions/{}", i),
                "title": format!("Accession number {}", i),
                "content_description": "Letters and diaries.",
                "publish": true
            }),
        );
    }
}
