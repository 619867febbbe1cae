//! FastAGI over loopback TCP, with a scripted fake Asterisk on the other end.

use asterisk_agi_tokio::{
    AgiError, ChannelStatus, FastAgiOptions, FastAgiServer, ListenerStatus, ReplyCode,
    SessionStream, StopReason,
};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const ENV_BLOCK: &str = "agi_network: yes\n\
                         agi_network_script: ivr\n\
                         agi_request: agi://127.0.0.1/ivr\n\
                         agi_channel: PJSIP/alice-00000001\n\
                         agi_language: en\n\
                         agi_type: PJSIP\n\
                         agi_uniqueid: 1700000000.1\n\
                         agi_callerid: 100\n\
                         agi_calleridname: Alice\n\
                         agi_context: default\n\
                         agi_extension: 500\n\
                         agi_priority: 2\n\
                         agi_arg_1: menu\n\
                         agi_arg_2: \n\
                         \n";

async fn listen() -> (FastAgiServer, SessionStream) {
    let options = FastAgiOptions {
        queue_size: 2,
        ..Default::default()
    };
    FastAgiServer::bind("127.0.0.1:0", options)
        .await
        .expect("failed to bind loopback listener")
}

/// Fake Asterisk: connect, send the environment, then answer each command.
async fn asterisk(server: &FastAgiServer, env: &str) -> BufReader<TcpStream> {
    let addr = server
        .local_addr()
        .expect("listener has an address");
    let mut stream = TcpStream::connect(addr)
        .await
        .expect("connect to listener");
    stream
        .write_all(env.as_bytes())
        .await
        .unwrap();
    BufReader::new(stream)
}

async fn expect_then_reply(switch: &mut BufReader<TcpStream>, expected: &str, reply: &str) {
    let mut line = String::new();
    switch
        .read_line(&mut line)
        .await
        .unwrap();
    assert_eq!(line, expected);
    switch
        .get_mut()
        .write_all(reply.as_bytes())
        .await
        .unwrap();
}

#[tokio::test]
async fn fastagi_session_environment() {
    let (server, mut sessions) = listen().await;
    let _switch = asterisk(&server, ENV_BLOCK).await;

    let session = sessions
        .recv()
        .await
        .unwrap();
    assert_eq!(
        session
            .environment()
            .len(),
        12
    );
    assert_eq!(session.env("channel"), Some("PJSIP/alice-00000001"));
    assert_eq!(session.args(), &["menu", ""]);
    assert!(session
        .peer_addr()
        .unwrap()
        .ip()
        .is_loopback());
}

#[tokio::test]
async fn fastagi_bad_handshake_then_good_connection() {
    let (server, mut sessions) = listen().await;

    let mut bad = asterisk(&server, "agi_network: yes\ngarbage line\n\n").await;
    let _good = asterisk(&server, ENV_BLOCK).await;

    let session = tokio::time::timeout(Duration::from_secs(5), sessions.recv())
        .await
        .expect("timeout waiting for session")
        .expect("listener stopped");
    assert_eq!(session.env("calleridname"), Some("Alice"));
    assert!(server.is_listening());

    // the listener dropped the rejected connection
    let mut rest = String::new();
    let n = bad
        .read_line(&mut rest)
        .await
        .unwrap_or(0);
    assert_eq!(n, 0);
}

#[tokio::test]
async fn fastagi_command_round_trip() {
    let (server, mut sessions) = listen().await;
    let mut switch = asterisk(&server, ENV_BLOCK).await;
    let mut agi = sessions
        .recv()
        .await
        .unwrap();

    let script = tokio::spawn(async move {
        expect_then_reply(&mut switch, "ANSWER\n", "200 result=0\n").await;
        expect_then_reply(&mut switch, "CHANNEL STATUS\n", "200 result=6\n").await;
        expect_then_reply(
            &mut switch,
            "STREAM FILE welcome 0123456789#*\n",
            "200 result=0 endpos=12000\n",
        )
        .await;
        expect_then_reply(&mut switch, "GET VARIABLE LANG\n", "200 result=1 (fr)\n").await;
        expect_then_reply(
            &mut switch,
            "DATABASE GET\n",
            "520-Invalid command syntax.  Proper usage follows:\n\
             Usage: DATABASE GET <family> <key>\n\
             520 End of proper usage.\n",
        )
        .await;
        expect_then_reply(&mut switch, "HANGUP\n", "200 result=1\n").await;
    });

    agi.answer()
        .await
        .unwrap();
    assert_eq!(
        agi.channel_status(None)
            .await
            .unwrap(),
        ChannelStatus::Up
    );
    let played = agi
        .stream_file("welcome", "0123456789#*")
        .await
        .unwrap();
    assert_eq!(played.endpos, Some(12000));
    assert_eq!(
        agi.get_variable("LANG")
            .await
            .unwrap()
            .as_deref(),
        Some("fr")
    );

    let usage = agi
        .execute("DATABASE GET", &[])
        .await
        .unwrap();
    assert_eq!(usage.code(), ReplyCode::Usage);
    assert!(usage
        .data()
        .contains("Usage: DATABASE GET"));

    agi.hangup(None)
        .await
        .unwrap();
    script
        .await
        .unwrap();
}

#[tokio::test]
async fn fastagi_hangup_notification() {
    let (server, mut sessions) = listen().await;
    let mut switch = asterisk(&server, ENV_BLOCK).await;
    let mut agi = sessions
        .recv()
        .await
        .unwrap();

    let script = tokio::spawn(async move {
        expect_then_reply(&mut switch, "WAIT FOR DIGIT 10000\n", "HANGUP\n200 result=-1\n").await;
        expect_then_reply(
            &mut switch,
            "NOOP\n",
            "511 Command Not Permitted on a dead channel\n",
        )
        .await;
    });

    let err = agi
        .wait_for_digit(10000)
        .await
        .unwrap_err();
    assert!(matches!(err, AgiError::HungUp));
    assert!(agi.is_hung_up());

    let resp = agi
        .execute("NOOP", &[])
        .await
        .unwrap();
    assert_eq!(resp.code(), ReplyCode::DeadChannel);
    script
        .await
        .unwrap();
}

#[tokio::test]
async fn fastagi_silent_peer_times_out() {
    let (server, mut sessions) = listen().await;
    let _switch = asterisk(&server, ENV_BLOCK).await;
    let mut agi = sessions
        .recv()
        .await
        .unwrap();
    agi.set_command_timeout(Duration::from_millis(100));

    let err = agi
        .execute("NOOP", &[])
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    assert!(matches!(
        agi.execute("NOOP", &[])
            .await,
        Err(AgiError::Desynchronized)
    ));
}

#[tokio::test]
async fn fastagi_concurrent_sessions_are_independent() {
    let (server, mut sessions) = listen().await;
    let mut first = asterisk(&server, "agi_uniqueid: 1\n\n").await;
    let mut agi_one = sessions
        .recv()
        .await
        .unwrap();
    let mut second = asterisk(&server, "agi_uniqueid: 2\n\n").await;
    let mut agi_two = sessions
        .recv()
        .await
        .unwrap();

    let switches = tokio::spawn(async move {
        expect_then_reply(&mut second, "NOOP\n", "200 result=0 (two)\n").await;
        expect_then_reply(&mut first, "NOOP\n", "200 result=0 (one)\n").await;
    });

    let (one, two) = tokio::join!(agi_one.execute("NOOP", &[]), agi_two.execute("NOOP", &[]));
    assert_eq!(
        one.unwrap()
            .value(),
        "one"
    );
    assert_eq!(
        two.unwrap()
            .value(),
        "two"
    );
    switches
        .await
        .unwrap();
}

#[tokio::test]
async fn fastagi_shutdown() {
    let (server, mut sessions) = listen().await;
    server.shutdown();
    assert!(server
        .terminated()
        .await
        .is_none());
    assert_eq!(
        sessions.status(),
        ListenerStatus::Stopped(StopReason::ShutdownRequested)
    );
    assert!(sessions
        .recv()
        .await
        .is_none());
}
