//! Contract Tests for Command Session
//!
//! These tests pin down how a command settles: exactly once, by whichever
//! of sentinel match, sentinel mismatch, console close or deadline comes
//! first, with the session ready for the next command afterwards.

use std::time::{Duration, Instant};

use sketchcc::config::SessionConfig;
use sketchcc::sandbox::{ConsoleEndpoint, ConsoleStreams};
use sketchcc::session::{CommandSession, CommandSpec, SessionState};
use sketchcc::terminal::ExpectedOutput;
use sketchcc::Error;
use tokio_test::{assert_err, assert_ok};

fn session() -> (CommandSession, ConsoleEndpoint) {
    let (console, endpoint) = ConsoleStreams::pair();
    (CommandSession::new(console, &SessionConfig::default()), endpoint)
}

fn print(endpoint: &ConsoleEndpoint, text: &str) {
    endpoint.output_tx.send(text.as_bytes().to_vec()).unwrap();
}

fn objcopy() -> CommandSpec {
    let command = "avr-objcopy -O ihex -R .eeprom /root/main.elf /root/main.hex";
    CommandSpec::new(command, ExpectedOutput::lines([command]))
}

/// Answer the first typed command with `reply`, then keep the console open
fn reply_once(mut endpoint: ConsoleEndpoint, reply: &'static str) {
    tokio::spawn(async move {
        endpoint.input_rx.recv().await;
        endpoint.output_tx.send(reply.as_bytes().to_vec()).unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
    });
}

#[tokio::test]
async fn test_matched_command_returns_lines() {
    let (mut session, endpoint) = session();
    reply_once(
        endpoint,
        "avr-objcopy -O ihex -R .eeprom /root/main.elf /root/main.hex\r\n/root # echo jobs done!\r\njobs done!\r\n/root # ",
    );

    let lines = assert_ok!(session.send(&objcopy(), Duration::from_secs(5)).await);

    // Settles on the sentinel; the rest of the chunk is still assembled
    assert_eq!(lines.last().map(String::as_str), Some("jobs done!"));
    assert_eq!(session.lines().last().map(String::as_str), Some("/root # "));
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_stale_output_is_discarded() {
    let (mut session, endpoint) = session();
    print(&endpoint, "old\r\n/root # echo jobs done!\r\njobs done!");
    reply_once(endpoint, "ls\r\nmain.cpp\r\n/root # echo jobs done!\r\njobs done!");

    let lines = session
        .send(
            &CommandSpec::new("ls", ExpectedOutput::lines(["main.cpp"])),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

    assert_eq!(lines.first().map(String::as_str), Some("ls"));
    assert!(!lines.iter().any(|line| line == "old"));
    assert!(session.console().stats().bytes_drained > 0);
}

#[tokio::test]
async fn test_output_arriving_in_pieces() {
    let (mut session, mut endpoint) = session();

    let console = tokio::spawn(async move {
        let typed = endpoint.input_rx.recv().await.unwrap();
        assert_eq!(typed, b"ls\necho jobs done!\n");
        for piece in ["ls\r\nmain.cpp\r\n/root # echo jo", "bs done!\r\njobs ", "done!"] {
            endpoint.output_tx.send(piece.as_bytes().to_vec()).unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        endpoint
    });

    let lines = session
        .send(
            &CommandSpec::new("ls", ExpectedOutput::lines(["main.cpp"])),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
    assert_eq!(lines, vec!["ls", "main.cpp", "/root # echo jobs done!", "jobs done!"]);
    console.await.unwrap();
}

#[tokio::test]
async fn test_mismatch_settles_before_deadline() {
    let (mut session, mut endpoint) = session();

    tokio::spawn(async move {
        endpoint.input_rx.recv().await;
        endpoint
            .output_tx
            .send(
                b"avr-objcopy -O ihex -R .eeprom /root/main.elf /root/main.hex\r\navr-objcopy: '/root/main.elf': No such file\r\n/root # echo jobs done!\r\njobs done!"
                    .to_vec(),
            )
            .unwrap();
        // Keep the console open
        tokio::time::sleep(Duration::from_secs(60)).await;
    });

    let started = Instant::now();
    let err = session.send(&objcopy(), Duration::from_secs(30)).await.unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(5));
    match err {
        Error::PatternMismatch {
            expected,
            diagnostic,
        } => {
            assert_eq!(expected, "avr-objcopy -O ihex -R .eeprom /root/main.elf /root/main.hex");
            assert_eq!(diagnostic, "avr-objcopy: '/root/main.elf': No such file");
        }
        other => panic!("expected a mismatch, got {:?}", other),
    }
    assert!(session.is_idle());
}

#[tokio::test]
async fn test_timeout_carries_partial_output() {
    let (mut session, mut endpoint) = session();

    tokio::spawn(async move {
        endpoint.input_rx.recv().await;
        endpoint
            .output_tx
            .send(b"make\r\nmake: building forever\r\n".to_vec())
            .unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
    });

    let started = Instant::now();
    let err = session
        .send(&CommandSpec::new("make", ExpectedOutput::Any), Duration::from_millis(100))
        .await
        .unwrap_err();

    assert!(started.elapsed() >= Duration::from_millis(100));
    assert!(err.is_command_failure());
    match err {
        Error::CommandTimeout { timeout, diagnostic } => {
            assert_eq!(timeout, Duration::from_millis(100));
            assert!(diagnostic.contains("make: building forever"));
        }
        other => panic!("expected a timeout, got {:?}", other),
    }
    assert!(session.is_idle());
}

#[tokio::test]
async fn test_sentinel_after_timeout_is_not_seen_twice() {
    let (mut session, mut endpoint) = session();

    let err = session
        .send(&CommandSpec::new("sleep 1", ExpectedOutput::Any), Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CommandTimeout { .. }));

    // The late completion of the first command arrives before the next one
    assert_eq!(endpoint.input_rx.recv().await.unwrap(), b"sleep 1\necho jobs done!\n");
    print(&endpoint, "sleep 1\r\n~ # echo jobs done!\r\njobs done!\r\n~ # ");

    let next = CommandSpec::new("pwd", ExpectedOutput::lines(["/root"]));
    let handle = tokio::spawn(async move {
        let result = session.send(&next, Duration::from_secs(5)).await;
        (session, result)
    });

    assert_eq!(endpoint.input_rx.recv().await.unwrap(), b"pwd\necho jobs done!\n");
    print(&endpoint, "pwd\r\n/root\r\n~ # echo jobs done!\r\njobs done!");

    let (session, result) = handle.await.unwrap();
    let lines = result.unwrap();
    assert_eq!(lines.first().map(String::as_str), Some("pwd"));
    assert!(session.console().stats().bytes_drained > 0);
}

#[tokio::test]
async fn test_console_close_fails_command() {
    let (mut session, mut endpoint) = session();

    tokio::spawn(async move {
        endpoint.input_rx.recv().await;
        endpoint.output_tx.send(b"reboot\r\nrebooting...\r\n".to_vec()).unwrap();
        drop(endpoint);
    });

    let err = session
        .send(&CommandSpec::new("reboot", ExpectedOutput::Any), Duration::from_secs(30))
        .await
        .unwrap_err();
    match err {
        Error::ConsoleClosed { diagnostic } => assert!(diagnostic.contains("rebooting...")),
        other => panic!("expected console closed, got {:?}", other),
    }
    assert!(session.is_idle());
}

#[tokio::test]
async fn test_write_to_closed_console_fails() {
    let (mut session, endpoint) = session();
    drop(endpoint);

    let err = assert_err!(
        session
            .send(&CommandSpec::new("ls", ExpectedOutput::Any), Duration::from_secs(1))
            .await
    );
    assert!(matches!(err, Error::ConsoleWriteFailed { .. }));
    assert!(session.is_idle());
    assert_eq!(session.console().stats().write_errors, 1);
}

#[tokio::test]
async fn test_dropped_send_leaves_command_in_flight() {
    let (mut session, _endpoint) = session();

    let abandoned = tokio::time::timeout(
        Duration::from_millis(20),
        session.send(&CommandSpec::new("sleep 100", ExpectedOutput::Any), Duration::from_secs(30)),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(session.state(), SessionState::AwaitingCompletion);

    let err = session
        .send(&CommandSpec::new("ls", ExpectedOutput::Any), Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CommandInFlight));
    assert_eq!(session.state(), SessionState::AwaitingCompletion);
}
