//! Scripted console sessions against a live engine.

use karma::ConsoleTransport;
use karma_test_utils::{directory, BOB};
use karma_workflow::{spawn_engine, ApprovalWorkflow, InMemoryLedger, KarmaLedger, WorkflowConfig};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

async fn run_script(script: &str) -> (String, Arc<InMemoryLedger>) {
    let directory = directory();
    let ledger = Arc::new(InMemoryLedger::new(directory.user_ids()));
    let out = SharedBuf::default();
    let transport = Arc::new(ConsoleTransport::new(out.clone()));
    let workflow = ApprovalWorkflow::new(
        WorkflowConfig::default(),
        ledger.clone(),
        Arc::new(directory),
        transport.clone(),
    );
    let (engine, task) = spawn_engine(workflow);

    karma::run(script.as_bytes(), &engine, &transport)
        .await
        .unwrap();
    engine.shutdown().await.unwrap();
    task.await.unwrap();

    (out.text(), ledger)
}

#[tokio::test]
async fn test_scripted_transfer() {
    // Ids: each line takes one, each prompt takes the next
    let script = "\
1 /up great review
1 select 2 2
3 confirm 4
1 /show 2
";
    let (text, ledger) = run_script(script).await;

    assert!(text.contains("[#2 > #1] Who should receive it?"), "{}", text);
    assert!(text.contains("[#2 deleted]"), "{}", text);
    assert!(
        text.contains("[#4 > #1] Alice asks +1 karma for Bob for: \"great review\""),
        "{}",
        text
    );
    assert!(
        text.contains("[> #1] * Bob receives +1 karma for: \"great review\""),
        "{}",
        text
    );
    assert!(text.contains("[> #6] * Bob has 1 karma"), "{}", text);
    assert_eq!(ledger.total_for(BOB).await.unwrap(), 1);
}

#[tokio::test]
async fn test_policy_and_unknown_input() {
    let script = "\
1 /up
1 select 2 2
2 confirm 4
nonsense
1 /dance
3 good morning
1 /help
";
    let (text, ledger) = run_script(script).await;

    assert!(
        text.contains("[> #4] ! The request cannot be approved by its recipient"),
        "{}",
        text
    );
    assert!(
        text.contains("[> #6] ! Unknown command, type /help for help"),
        "{}",
        text
    );
    assert!(
        text.contains("[> #7] ! Unknown command, type /help for help"),
        "{}",
        text
    );
    assert!(text.contains("Supported commands:"), "{}", text);
    assert_eq!(ledger.total_for(BOB).await.unwrap(), 0);
}

#[tokio::test]
async fn test_stale_answer() {
    let script = "\
1 /up
1 select 2 2
3 decline 4
3 confirm 4
";
    let (text, ledger) = run_script(script).await;

    assert!(text.contains("[> #1] * The request was declined"), "{}", text);
    assert!(text.contains("! The request is no longer valid"), "{}", text);
    assert_eq!(ledger.total_for(BOB).await.unwrap(), 0);
}
