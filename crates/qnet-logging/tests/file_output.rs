//! File output end to end: install the subscriber once, log inside nested
//! spans, and read the JSONL back.

use std::fs;
use std::path::PathBuf;

use qnet_logging::{FileConfig, QnetSubscriberBuilder, RotationStrategy};
use tracing::{info, info_span};

fn log_dir() -> PathBuf {
    std::env::temp_dir().join(format!("qnet-logging-{}", std::process::id()))
}

#[test]
fn test_jsonl_file_carries_trial_and_agent_spans() {
    let dir = log_dir();
    let guard = QnetSubscriberBuilder::new()
        .with_console(false)
        .with_level("info")
        .with_file_output(FileConfig {
            directory: dir.clone(),
            prefix: "run".to_string(),
            rotation: RotationStrategy::Never,
            max_files: None,
        })
        .init()
        .unwrap();

    {
        let _trial = info_span!("trial", index = 3, seed = 42u64).entered();
        let _agent = info_span!("agent", agent = "Alice").entered();
        info!(delivered = 4, "trial finished");
    }
    // flush the background writer
    drop(guard);

    let text = fs::read_to_string(dir.join("run.jsonl")).unwrap();
    let line = text
        .lines()
        .find(|line| line.contains("trial finished"))
        .expect("event was written");
    let event: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(event["delivered"], 4);
    assert_eq!(event["span"]["agent"], "Alice");
    let spans = event["spans"].as_array().unwrap();
    assert_eq!(spans[0]["name"], "trial");
    assert_eq!(spans[0]["index"], 3);

    // a second subscriber cannot be installed
    assert!(QnetSubscriberBuilder::new().with_console(false).init().is_err());

    let _ = fs::remove_dir_all(dir);
}
