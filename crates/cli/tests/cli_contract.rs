use assert_cmd::cargo::cargo_bin_cmd;
use lopdf::{dictionary, Document, Object};
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

fn write_json(dir: &Path, name: &str, value: &Value) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_vec_pretty(value).expect("json should serialize"))
        .expect("fixture should be written");
    path
}

fn write_pdf(dir: &Path, name: &str, media_boxes: &[[i64; 4]]) -> PathBuf {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let kids: Vec<Object> = media_boxes
        .iter()
        .map(|media_box| {
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => media_box.iter().map(|v| Object::Integer(*v)).collect::<Vec<_>>(),
            })
            .into()
        })
        .collect();
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! { "Type" => "Pages", "Kids" => kids, "Count" => count }),
    );
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);

    let path = dir.join(name);
    doc.save(&path).expect("sample PDF should be written");
    path
}

fn document(annotations: Value) -> Value {
    json!({
        "id": "doc-1",
        "name": "report.pdf",
        "url": "memory://report.pdf",
        "storagePath": "users/u1/pdfs/1_report.pdf",
        "createdAt": 1,
        "annotations": annotations,
    })
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should contain valid json")
}

fn square_drag() -> Value {
    json!([
        {"tool": "square"},
        {"down": {"page": 0, "x": 10, "y": 10}},
        {"move": {"x": 60, "y": 40}},
        "up"
    ])
}

#[test]
fn version_prints_package_version() {
    cargo_bin_cmd!("pdf-annotator")
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn sanitize_drops_unusable_entries() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let doc = write_json(
        temp.path(),
        "doc.json",
        &document(json!([
            {"id": "1", "type": "square", "pageIndex": 0, "x": 1, "y": 2, "width": 3, "height": 4,
             "color": "#00ff00", "isSelected": true},
            {"id": "2", "type": "hologram", "pageIndex": 0},
            {"id": "1", "type": "circle", "pageIndex": 0, "x": 0, "y": 0, "width": 5, "height": 5},
            {"id": "3", "type": "text", "pageIndex": 1, "x": 5, "y": 5, "text": "hi", "fontSize": 16}
        ])),
    );

    let output = cargo_bin_cmd!("pdf-annotator").arg("sanitize").arg(&doc).assert().success();
    let value = stdout_json(output.get_output());
    let entries = value.as_array().expect("payload should be an array");

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["type"], "square");
    assert_eq!(entries[0]["color"], "#00ff00");
    assert!(entries[0].get("isSelected").is_none());
    assert_eq!(entries[1]["text"], "hi");
}

#[test]
fn replay_draws_and_autosaves_silently() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let doc = write_json(temp.path(), "doc.json", &document(json!([])));
    let script = write_json(temp.path(), "script.json", &square_drag());
    let saved_path = temp.path().join("saved.json");

    let output = cargo_bin_cmd!("pdf-annotator")
        .arg("replay")
        .arg(&doc)
        .arg(&script)
        .arg("--output")
        .arg(&saved_path)
        .env_remove("PDF_ANNOTATOR_AUTOSAVE")
        .env_remove("PDF_ANNOTATOR_ZOOM")
        .assert()
        .success();
    let report = stdout_json(output.get_output());

    let annotations = report["annotations"].as_array().expect("annotations array");
    assert_eq!(annotations.len(), 1);
    assert_eq!(annotations[0]["x"], 10.0);
    assert_eq!(annotations[0]["width"], 50.0);
    assert_eq!(annotations[0]["height"], 30.0);
    assert_eq!(report["canUndo"], true);
    assert_eq!(report["notifications"], json!([]));

    let saved: Value =
        serde_json::from_slice(&fs::read(&saved_path).expect("saved record should exist")).unwrap();
    assert_eq!(saved["id"], "doc-1");
    assert_eq!(saved["annotations"].as_array().map(Vec::len), Some(1));
}

#[test]
fn replay_explicit_save_notifies() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let doc = write_json(temp.path(), "doc.json", &document(json!([])));
    let mut steps = square_drag();
    steps.as_array_mut().unwrap().push(json!("save"));
    let script = write_json(temp.path(), "script.json", &steps);

    let output = cargo_bin_cmd!("pdf-annotator")
        .arg("replay")
        .arg(&doc)
        .arg(&script)
        .env("PDF_ANNOTATOR_AUTOSAVE", "off")
        .assert()
        .success();
    let report = stdout_json(output.get_output());

    assert_eq!(
        report["notifications"],
        json!([{"level": "info", "message": "Annotations Saved!"}])
    );
}

#[test]
fn replay_undo_leaves_redo_available() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let doc = write_json(temp.path(), "doc.json", &document(json!([])));
    let mut steps = square_drag();
    steps.as_array_mut().unwrap().push(json!("undo"));
    let script = write_json(temp.path(), "script.json", &steps);
    let saved_path = temp.path().join("saved.json");

    let output = cargo_bin_cmd!("pdf-annotator")
        .arg("replay")
        .arg(&doc)
        .arg(&script)
        .arg("--output")
        .arg(&saved_path)
        .env_remove("PDF_ANNOTATOR_AUTOSAVE")
        .assert()
        .success();
    let report = stdout_json(output.get_output());

    assert_eq!(report["annotations"], json!([]));
    assert_eq!(report["canUndo"], false);
    assert_eq!(report["canRedo"], true);

    let saved: Value = serde_json::from_slice(&fs::read(&saved_path).unwrap()).unwrap();
    assert_eq!(saved["annotations"], json!([]));
}

#[test]
fn replay_normalizes_by_zoom() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let doc = write_json(temp.path(), "doc.json", &document(json!([])));
    let script = write_json(
        temp.path(),
        "script.json",
        &json!([
            {"zoom": 2.0},
            {"tool": "circle"},
            {"down": {"page": 0, "x": 20, "y": 20}},
            {"move": {"x": 120, "y": 80}},
            "up"
        ]),
    );

    let output =
        cargo_bin_cmd!("pdf-annotator").arg("replay").arg(&doc).arg(&script).assert().success();
    let report = stdout_json(output.get_output());

    assert_eq!(report["zoom"], 2.0);
    let circle = &report["annotations"][0];
    assert_eq!(circle["type"], "circle");
    assert_eq!(circle["x"], 10.0);
    assert_eq!(circle["width"], 50.0);
    assert_eq!(circle["height"], 30.0);
}

#[test]
fn replay_places_prompted_text() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let doc = write_json(temp.path(), "doc.json", &document(json!([])));
    let script = write_json(
        temp.path(),
        "script.json",
        &json!([
            {"tool": "text"},
            {"down": {"page": 0, "x": 5, "y": 5}},
            {"prompt": "Reviewed"},
            {"down": {"page": 0, "x": 30, "y": 40}},
            "up"
        ]),
    );

    let output =
        cargo_bin_cmd!("pdf-annotator").arg("replay").arg(&doc).arg(&script).assert().success();
    let report = stdout_json(output.get_output());

    let annotations = report["annotations"].as_array().unwrap();
    assert_eq!(annotations.len(), 1);
    assert_eq!(annotations[0]["text"], "Reviewed");
    assert_eq!(annotations[0]["x"], 30.0);
}

#[test]
fn replay_rejects_malformed_script() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let doc = write_json(temp.path(), "doc.json", &document(json!([])));
    let script = write_json(temp.path(), "script.json", &json!([{"teleport": 1}]));

    cargo_bin_cmd!("pdf-annotator")
        .arg("replay")
        .arg(&doc)
        .arg(&script)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid replay script"));
}

#[test]
fn compose_emits_overlay_commands() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let doc = write_json(
        temp.path(),
        "doc.json",
        &document(json!([
            {"id": "1", "type": "square", "pageIndex": 0, "x": 10, "y": 20, "width": 30, "height": 40,
             "color": "#123456"},
            {"id": "2", "type": "square", "pageIndex": 1, "x": 0, "y": 0, "width": 5, "height": 5}
        ])),
    );

    let output = cargo_bin_cmd!("pdf-annotator")
        .arg("compose")
        .arg(&doc)
        .arg("--page")
        .arg("1")
        .arg("--zoom")
        .arg("2")
        .env_remove("PDF_ANNOTATOR_ZOOM")
        .assert()
        .success();
    let commands = stdout_json(output.get_output());
    let commands = commands.as_array().expect("commands array");

    assert_eq!(commands.len(), 2);
    assert_eq!(commands[0]["op"], "clear");
    assert_eq!(commands[1]["op"], "strokeRect");
    assert_eq!(commands[1]["rect"], json!({"x": 20.0, "y": 40.0, "width": 60.0, "height": 80.0}));
    assert_eq!(commands[1]["stroke"]["color"], "#123456");
}

#[test]
fn compose_rejects_page_outside_pdf() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let doc = write_json(temp.path(), "doc.json", &document(json!([])));
    let pdf = write_pdf(temp.path(), "one.pdf", &[[0, 0, 300, 400]]);

    cargo_bin_cmd!("pdf-annotator")
        .arg("compose")
        .arg(&doc)
        .arg("--page")
        .arg("3")
        .arg("--pdf")
        .arg(&pdf)
        .assert()
        .failure()
        .stderr(predicate::str::contains("out of range"));
}

#[test]
fn render_writes_png_file() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_pdf(temp.path(), "two.pdf", &[[0, 0, 300, 400], [0, 0, 100, 50]]);
    let output_path = temp.path().join("page.png");

    cargo_bin_cmd!("pdf-annotator")
        .arg("render")
        .arg(&pdf)
        .arg("--page")
        .arg("2")
        .arg("--zoom")
        .arg("2")
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success();

    let bytes = fs::read(&output_path).expect("png should exist");
    assert!(bytes.starts_with(&[0x89, b'P', b'N', b'G']));
}

#[test]
fn render_fails_for_missing_file() {
    cargo_bin_cmd!("pdf-annotator")
        .arg("render")
        .arg("does-not-exist.pdf")
        .assert()
        .failure()
        .stderr(predicate::str::contains("file does not exist"));
}

#[test]
fn render_fails_for_invalid_pdf() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let path = temp.path().join("invalid.pdf");
    fs::write(&path, b"not a pdf").unwrap();

    cargo_bin_cmd!("pdf-annotator")
        .arg("render")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to open PDF"));
}

#[test]
fn import_list_delete_round_trip() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_pdf(temp.path(), "notes.pdf", &[[0, 0, 612, 792]]);
    let root = temp.path().join("store");

    let output = cargo_bin_cmd!("pdf-annotator")
        .arg("import")
        .arg(&pdf)
        .arg("--root")
        .arg(&root)
        .arg("--user")
        .arg("u1")
        .assert()
        .success();
    let record = stdout_json(output.get_output());
    let id = record["id"].as_str().expect("record id").to_owned();
    assert_eq!(record["name"], "notes.pdf");
    assert_eq!(record["annotations"], json!([]));
    assert!(record["storagePath"].as_str().unwrap().starts_with("users/u1/pdfs/"));

    let output = cargo_bin_cmd!("pdf-annotator")
        .arg("list")
        .arg("--root")
        .arg(&root)
        .arg("--user")
        .arg("u1")
        .assert()
        .success();
    let listed = stdout_json(output.get_output());
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
    assert_eq!(listed[0]["id"], id.as_str());

    // Other users see nothing
    let output =
        cargo_bin_cmd!("pdf-annotator").arg("list").arg("--root").arg(&root).assert().success();
    assert_eq!(stdout_json(output.get_output()), json!([]));

    cargo_bin_cmd!("pdf-annotator")
        .arg("delete")
        .arg(&id)
        .arg("--root")
        .arg(&root)
        .arg("--user")
        .arg("u1")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("deleted:{id}")));

    let output = cargo_bin_cmd!("pdf-annotator")
        .arg("list")
        .arg("--root")
        .arg(&root)
        .arg("--user")
        .arg("u1")
        .assert()
        .success();
    assert_eq!(stdout_json(output.get_output()), json!([]));
}

#[test]
fn config_reflects_environment() {
    let output = cargo_bin_cmd!("pdf-annotator")
        .arg("config")
        .env("PDF_ANNOTATOR_ZOOM", "2")
        .env("PDF_ANNOTATOR_WORKER_URL", "https://cdn.example/pdf.worker.js")
        .env_remove("PDF_ANNOTATOR_AUTOSAVE")
        .assert()
        .success();
    let config = stdout_json(output.get_output());

    assert_eq!(config["initial_zoom"], 2.0);
    assert_eq!(config["worker_url"], "https://cdn.example/pdf.worker.js");
    assert_eq!(config["autosave"], true);
}

#[test]
fn config_rejects_invalid_environment() {
    cargo_bin_cmd!("pdf-annotator")
        .arg("config")
        .env("PDF_ANNOTATOR_AUTOSAVE", "sometimes")
        .assert()
        .failure()
        .stderr(predicate::str::contains("PDF_ANNOTATOR_AUTOSAVE"));
}
