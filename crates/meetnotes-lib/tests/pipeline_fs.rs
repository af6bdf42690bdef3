//! End-to-end dispatch against real files in a temp directory.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use meetnotes::{
    CharEstimateTokenizer, DispatchOutcome, Dispatcher, GenerationError, Message,
    QuestionGenerator, WatchConfig, WatchEvent, WatchEventKind,
};
use tokio::sync::{mpsc, watch};

/// Answers with the last user turn it was shown.
#[derive(Default)]
struct EchoGenerator {
    windows: Mutex<Vec<Vec<Message>>>,
}

#[async_trait]
impl QuestionGenerator for EchoGenerator {
    async fn generate(&self, messages: &[Message]) -> Result<String, GenerationError> {
        self.windows.lock().unwrap().push(messages.to_vec());
        let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        Ok(format!("What about \"{last}\"?"))
    }

    fn model_name(&self) -> &str {
        "echo"
    }
}

fn dispatcher(root: PathBuf, budget: usize, generator: Arc<EchoGenerator>) -> Result<Dispatcher> {
    let config = WatchConfig {
        root,
        token_budget: budget,
        system_prompt: "sys".into(),
        ..WatchConfig::default()
    };
    Ok(Dispatcher::new(
        &config,
        Box::new(CharEstimateTokenizer::default()),
        generator,
    )?)
}

#[tokio::test]
async fn appending_to_a_note_produces_questions_and_a_transcript() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let note = dir.path().join("2023-06-01 acme.txt");
    let generator = Arc::new(EchoGenerator::default());
    let mut dispatcher = dispatcher(dir.path().to_path_buf(), 1000, generator.clone())?;

    std::fs::write(&note, "\u{feff}[Anna]: pricing is per seat\n")?;
    let first = dispatcher
        .handle(WatchEvent::new(&note, WatchEventKind::Created))
        .await?;
    let DispatchOutcome::Generated(first) = first else {
        panic!("expected a question for the new note");
    };
    assert_eq!(first.question, "What about \"Anna: pricing is per seat\"?");

    // Editors often emit several events for one save.
    let dup = dispatcher
        .handle(WatchEvent::new(&note, WatchEventKind::Modified))
        .await?;
    assert!(matches!(dup, DispatchOutcome::Unchanged));

    std::fs::write(
        &note,
        "[Anna]: pricing is per seat\n[Bo]: and the\nenterprise tier?\n",
    )?;
    let second = dispatcher
        .handle(WatchEvent::new(&note, WatchEventKind::Modified))
        .await?;
    let DispatchOutcome::Generated(second) = second else {
        panic!("expected a question for the edit");
    };
    assert_eq!(
        second.window.turns().last().map(|m| m.content.as_str()),
        Some("Bo: and the enterprise tier?")
    );

    let log = second.transcript.clone().expect("transcripts are on by default");
    assert_eq!(log, dir.path().join("2023-06-01 acme.txt.log"));
    let text = std::fs::read_to_string(&log)?;
    assert!(text.contains("model=echo"));
    assert!(text.contains(&first.question));
    assert!(text.contains(&second.question));

    // The sidecar's own change notification is filtered out.
    let sidecar = dispatcher
        .handle(WatchEvent::new(&log, WatchEventKind::Modified))
        .await?;
    assert!(matches!(sidecar, DispatchOutcome::Ignored(_)));

    assert_eq!(generator.windows.lock().unwrap().len(), 2);
    Ok(())
}

#[tokio::test]
async fn tight_budget_keeps_only_the_latest_turns() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let note = dir.path().join("long.txt");
    let generator = Arc::new(EchoGenerator::default());
    let mut dispatcher = dispatcher(dir.path().to_path_buf(), 40, generator.clone())?;

    let mut text = String::new();
    for i in 0..20 {
        text.push_str(&format!("[P{}]: item {}\n", i % 2, i));
    }
    std::fs::write(&note, text)?;

    let outcome = dispatcher
        .handle(WatchEvent::new(&note, WatchEventKind::Modified))
        .await?;
    let DispatchOutcome::Generated(generated) = outcome else {
        panic!("expected a question");
    };
    let window = &generated.window;
    assert!(window.dropped > 0);
    assert!(window.token_count <= 40);
    assert_eq!(
        window.turns().last().map(|m| m.content.as_str()),
        Some("P1: item 19")
    );
    Ok(())
}

#[tokio::test]
async fn worker_loop_drains_filesystem_events() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.md");
    std::fs::write(&a, "[A]: one")?;
    std::fs::write(&b, "[B]: two")?;

    let generator = Arc::new(EchoGenerator::default());
    let dispatcher = dispatcher(dir.path().to_path_buf(), 1000, generator.clone())?;

    let (tx, rx) = mpsc::unbounded_channel();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    tx.send(WatchEvent::new(&a, WatchEventKind::Created))?;
    tx.send(WatchEvent::new(&b, WatchEventKind::Created))?;
    tx.send(WatchEvent::new(&a, WatchEventKind::Deleted))?;
    drop(tx);

    let mut questions = Vec::new();
    let summary = dispatcher
        .run(rx, shutdown_rx, |g| questions.push(g.question.clone()))
        .await;

    assert_eq!(questions, vec!["What about \"A: one\"?".to_string()]);
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.generated, 1);
    assert_eq!(summary.ignored, 2);
    Ok(())
}
