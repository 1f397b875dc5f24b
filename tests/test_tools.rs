//! Integration tests for tool-call dispatch.
//!
//! Tests cover:
//! - detect_windows with loose arguments
//! - recognize_digits from string-encoded lists
//! - aggregate from predictions produced by an earlier call
//! - Error observations

mod common;

use serde_json::json;

use common::*;

#[test]
fn test_detect_then_recognize_then_aggregate() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let meter = write_meter(dir.path(), "meter.png");
    let tools = mock_tools(
        MockWindowModel::new(meter_boxes()),
        MockDigitModel::new(3, 0.75),
        &dir.path().join("scratch"),
    );

    // Stray quotes and a numeric string, as an agent tends to send them
    let detected = tools.call(
        "detect_windows",
        &json!({"image_path": format!(" '{}' ", meter.display()), "min_confidence": "0.3"}),
    );
    let Observation::WindowsFound { files, confidences, threshold } = &detected else {
        panic!("expected windows, got {:?}", detected);
    };
    assert_eq!(files.len(), 5);
    assert_eq!(confidences.len(), 5);
    assert_eq!(threshold.percent(), 30);
    assert!(detected.message().starts_with("OBSERVATION: SUCCESS. Found 5 windows using threshold 0.3."));

    // The file list comes back as a Python-style string
    let listing = format!(
        "[{}]",
        files.iter().map(|f| format!("'{}'", f.display())).collect::<Vec<_>>().join(", ")
    );
    let recognized = tools.call("recognize_digits", &json!({ "file_paths": listing }));
    let Observation::Digits { predictions } = &recognized else {
        panic!("expected digits, got {:?}", recognized);
    };
    assert_eq!(predictions.len(), 5);

    let predictions_json = serde_json::to_string(predictions)?;
    let aggregated = tools.call("aggregate", &json!({ "predictions": predictions_json }));
    match aggregated {
        Observation::Reading(reading) => {
            assert_eq!(reading.digits, "33333");
            assert_eq!(reading.reliability_score, 0.75);
        }
        other => panic!("expected a reading, got {:?}", other),
    }
    Ok(())
}

#[test]
fn test_detect_defaults_to_half() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let meter = write_meter(dir.path(), "meter.png");
    let window_model = MockWindowModel::new(meter_boxes());
    let tools = mock_tools(window_model, MockDigitModel::new(3, 0.75), &dir.path().join("scratch"));

    // A bare string is taken as the image path
    let observation = tools.call("detect_windows", &json!(meter.display().to_string()));
    assert_eq!(
        observation,
        Observation::count_mismatch(Threshold::new(0.5)?, 3)
    );
    assert_eq!(tools.detector().workspace().root(), dir.path().join("scratch"));

    let json = observation.to_json();
    assert_eq!(json["status"], "count_mismatch");
    assert_eq!(json["found"], 3);
    Ok(())
}

#[test]
fn test_bad_threshold_is_reported() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let meter = write_meter(dir.path(), "meter.png");
    let window_model = MockWindowModel::new(meter_boxes());
    let tools = mock_tools(window_model, MockDigitModel::new(3, 0.75), &dir.path().join("scratch"));

    for bad in [json!("high"), json!(0), json!(1.5), json!(-0.2)] {
        let observation = tools.call(
            "detect_windows",
            &json!({"image_path": meter.display().to_string(), "conf_threshold": bad}),
        );
        let json = observation.to_json();
        assert_eq!(json["status"], "error");
        assert_eq!(json["kind"], "bad_threshold");
        assert_eq!(json["fatal"], false);
    }

    // No crops were written
    assert!(tools.detector().workspace().root().read_dir()?.next().is_none());
    Ok(())
}

#[test]
fn test_missing_image_observation() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let tools = mock_tools(
        MockWindowModel::new(meter_boxes()),
        MockDigitModel::new(3, 0.75),
        &dir.path().join("scratch"),
    );

    let observation = tools.call("detect_windows", &json!({"image_path": "no_such_meter.jpg"}));
    assert!(!observation.is_success());
    assert_eq!(observation.message(), "OBSERVATION: ERROR. File no_such_meter.jpg does not exist.");
    Ok(())
}

#[test]
fn test_recognize_accepts_json_array() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let crop = write_crop(dir.path(), "c_t50_0.png", &digit_crop(30, 50));
    let tools = mock_tools(
        MockWindowModel::new(Vec::new()),
        MockDigitModel::new(6, 0.5),
        &dir.path().join("scratch"),
    );

    let observation = tools.call(
        "recognize_digits",
        &json!({"file_paths": [crop.display().to_string(), "gone.png"]}),
    );
    let json = observation.to_json();
    assert_eq!(json["status"], "digits");
    assert_eq!(json["predictions"][0]["digit"], 6);
    assert_eq!(json["predictions"][1]["digit"], "?");
    assert_eq!(json["predictions"][1]["confidence"], 0.0);
    Ok(())
}

#[test]
fn test_unparsable_inputs() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let tools = mock_tools(
        MockWindowModel::new(Vec::new()),
        MockDigitModel::new(6, 0.5),
        &dir.path().join("scratch"),
    );

    let observation = tools.call("recognize_digits", &json!({"file_paths": "a.png, b.png"}));
    assert_eq!(observation.to_json()["kind"], "unparsable_list");

    let observation = tools.call("aggregate", &json!({"predictions": "five digits"}));
    assert_eq!(observation.to_json()["kind"], "unparsable_predictions");

    let observation = tools.call("read_gauge", &json!({}));
    assert_eq!(observation.to_json()["kind"], "unknown_tool");
    Ok(())
}

#[test]
fn test_aggregate_python_repr() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let tools = mock_tools(
        MockWindowModel::new(Vec::new()),
        MockDigitModel::new(6, 0.5),
        &dir.path().join("scratch"),
    );

    let observation = tools.call(
        "aggregate",
        &json!("[{'digit': 0, 'confidence': 0.99}, {'digit': '?', 'confidence': 0.0}, {'digit': 5, 'confidence': 0.91}, {'digit': 8, 'confidence': 0.95}, {'digit': 0, 'confidence': 0.99}]"),
    );
    let json = observation.to_json();
    assert_eq!(json["digits"], "0?580");
    assert_eq!(json["reliability_score"], 0.768);
    assert_eq!(json["unreadable"], json!([1]));
    Ok(())
}

#[test]
fn test_detector_failure_is_fatal() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let meter = write_meter(dir.path(), "meter.png");
    let tools = mock_tools(MockWindowModel::failing(), MockDigitModel::new(6, 0.5), &dir.path().join("scratch"));

    let observation = tools.call("detect_windows", &json!({"image_path": meter.display().to_string()}));
    match observation {
        Observation::Error { kind, fatal, .. } => {
            assert_eq!(kind, "model_invocation");
            assert!(fatal);
        }
        other => panic!("expected an error, got {:?}", other),
    }
    Ok(())
}

#[test]
fn test_aggregate_python_repr_with_apostrophe() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let tools = mock_tools(
        MockWindowModel::new(Vec::new()),
        MockDigitModel::new(6, 0.5),
        &dir.path().join("scratch"),
    );

    let observation = tools.call(
        "aggregate",
        &json!({"predictions": r#"[{'digit': 1, 'confidence': 0.5}, {'digit': '?', 'confidence': 0.0, 'error': "Could not read o'brien_t50_1.png"}]"#}),
    );
    let json = observation.to_json();
    assert_eq!(json["digits"], "1?");
    assert_eq!(json["reliability_score"], 0.25);
    Ok(())
}
