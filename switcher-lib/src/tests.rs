use crate::constants::*;
use crate::crc::{crc16, sign};
use crate::device::Switcher;
use crate::discovery::{StatusEvent, StatusListener, discover_on, identifier_matches};
use crate::error::SwitcherError;
use crate::events::SwitcherEvent;
use crate::message::{Command, FrameContext, clamp_shutdown};
use crate::packet::{BroadcastFrame, LoginReply, StatusReply, is_broadcast};
use crate::status::{DeviceId, DeviceState, SessionToken};
use bytes::Bytes;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};

fn test_device_id() -> DeviceId {
    "a1b26b".parse().expect("valid device id")
}

fn test_context(token: Option<SessionToken>) -> FrameContext {
    FrameContext {
        device_id: test_device_id(),
        phone_id: [0x12, 0x34],
        password: [0x01, 0x02, 0x03, 0x04],
        token,
        timestamp: 0x5F00_0000,
    }
}

/// A broadcast as a device on 192.168.1.77 named "kitchen-heater" would
/// send it. The id's third byte doubles as the name's first byte on the
/// wire, so the fixture uses an id ending in 0x6B ('k').
fn sample_broadcast() -> Vec<u8> {
    let mut frame = vec![0u8; BROADCAST_LEN];
    frame[..2].copy_from_slice(&FRAME_MAGIC);
    frame[BCAST_ID_OFFSET..BCAST_ID_OFFSET + 3].copy_from_slice(&[0xA1, 0xB2, 0x6B]);
    let name = b"kitchen-heater";
    frame[BCAST_NAME_OFFSET..BCAST_NAME_OFFSET + name.len()].copy_from_slice(name);
    frame[BCAST_IP_OFFSET..BCAST_IP_OFFSET + 4].copy_from_slice(&[192, 168, 1, 77]);
    frame[BCAST_STATE_OFFSET..BCAST_STATE_OFFSET + 2].copy_from_slice(&[0x01, 0x00]);
    frame[BCAST_POWER_OFFSET..BCAST_POWER_OFFSET + 2].copy_from_slice(&1234u16.to_le_bytes());
    frame[BCAST_REMAINING_OFFSET..BCAST_REMAINING_OFFSET + 4]
        .copy_from_slice(&5400u32.to_le_bytes());
    frame[BCAST_DEFAULT_SHUTDOWN_OFFSET..BCAST_DEFAULT_SHUTDOWN_OFFSET + 4]
        .copy_from_slice(&7200u32.to_le_bytes());
    frame
}

fn decode_sample() -> crate::status::DeviceStatus {
    BroadcastFrame::try_from(Bytes::from(sample_broadcast()))
        .expect("sample is a valid broadcast")
        .decode()
}

// --- CRC and signing ---

#[test]
fn crc16_matches_xmodem_golden_vector() {
    // CRC-16/XMODEM check value for "123456789"
    assert_eq!(crc16(b"123456789"), 0x31C3);
}

#[test]
fn crc16_of_empty_input_is_zero() {
    assert_eq!(crc16(&[]), 0);
}

#[test]
fn signing_appends_four_byte_trailer() {
    let mut frame = hex::decode("fef0300002320103").unwrap();
    let unsigned_len = frame.len();
    sign(&mut frame);
    assert_eq!(frame.len(), unsigned_len + SIGNATURE_LEN);
    assert_eq!(
        &frame[unsigned_len..unsigned_len + 2],
        &crc16(&frame[..unsigned_len]).to_le_bytes()
    );
}

#[test]
fn signing_is_deterministic() {
    let mut a = sample_broadcast();
    let mut b = sample_broadcast();
    sign(&mut a);
    sign(&mut b);
    assert_eq!(a, b);
}

#[test]
fn signing_reacts_to_any_input_change() {
    let mut a = sample_broadcast();
    let mut b = sample_broadcast();
    b[40] ^= 0x01;
    sign(&mut a);
    sign(&mut b);
    assert_ne!(&a[a.len() - 4..], &b[b.len() - 4..]);
}

// --- Broadcast validation and decoding ---

#[test]
fn is_broadcast_accepts_exact_shape_only() {
    let frame = sample_broadcast();
    assert!(is_broadcast(&frame));

    assert!(!is_broadcast(&frame[..BROADCAST_LEN - 1]));
    let mut long = frame.clone();
    long.push(0);
    assert!(!is_broadcast(&long));

    let mut wrong_magic = frame.clone();
    wrong_magic[0] = 0xFF;
    assert!(!is_broadcast(&wrong_magic));
}

#[test]
fn broadcast_frame_rejects_wrong_shape() {
    let short = Bytes::from(sample_broadcast()[..BROADCAST_LEN - 1].to_vec());
    assert!(matches!(
        BroadcastFrame::try_from(short),
        Err(SwitcherError::InvalidPacket(_))
    ));
}

#[test]
fn broadcast_decodes_device_name() {
    assert_eq!(decode_sample().name, "kitchen-heater");
}

#[test]
fn broadcast_decodes_device_id() {
    assert_eq!(decode_sample().id, test_device_id());
}

#[test]
fn broadcast_decodes_source_address() {
    assert_eq!(decode_sample().ip, Ipv4Addr::new(192, 168, 1, 77));
}

#[test]
fn broadcast_decodes_switch_state() {
    assert_eq!(decode_sample().state, DeviceState::On);

    let mut off = sample_broadcast();
    off[BCAST_STATE_OFFSET..BCAST_STATE_OFFSET + 2].copy_from_slice(&[0x00, 0x00]);
    let status = BroadcastFrame::try_from(Bytes::from(off)).unwrap().decode();
    assert_eq!(status.state, DeviceState::Off);
}

#[test]
fn broadcast_decodes_power_consumption() {
    assert_eq!(decode_sample().power_watts, 1234);
}

#[test]
fn broadcast_decodes_remaining_seconds() {
    assert_eq!(decode_sample().remaining_seconds, 5400);
}

#[test]
fn broadcast_decodes_default_shutdown_seconds() {
    assert_eq!(decode_sample().default_shutdown_seconds, 7200);
}

// --- Outbound frame construction ---

#[test]
fn login_frame_layout() {
    let frame = Command::Login.to_frame(&test_context(None)).unwrap();
    assert_eq!(frame.len(), LOGIN_FRAME_LEN);
    // magic, declared length (trailer included), version block, opcode
    assert_eq!(hex::encode(&frame[..8]), "fef052000232a100");
    // login sends a zero token placeholder
    assert_eq!(&frame[TOKEN_OFFSET..TOKEN_OFFSET + 4], &[0u8; 4]);
    // send-time timestamp, little-endian
    assert_eq!(&frame[24..28], &0x5F00_0000u32.to_le_bytes());
    assert_eq!(&frame[38..40], &INNER_MAGIC);
    assert_eq!(&frame[42..44], &[0x12, 0x34]);
    assert_eq!(&frame[46..50], &[0x01, 0x02, 0x03, 0x04]);
}

#[test]
fn query_frame_layout() {
    let token = SessionToken::from_bytes([0xDE, 0xAD, 0xBE, 0xEF]);
    let frame = Command::QueryStatus
        .to_frame(&test_context(Some(token)))
        .unwrap();
    assert_eq!(frame.len(), QUERY_FRAME_LEN);
    assert_eq!(&frame[2..4], &(QUERY_FRAME_LEN as u16).to_le_bytes());
    assert_eq!(&frame[6..8], &[0x01, 0x03]);
    assert_eq!(&frame[TOKEN_OFFSET..TOKEN_OFFSET + 4], &[0xDE, 0xAD, 0xBE, 0xEF]);
    assert_eq!(&frame[40..43], test_device_id().as_bytes());
}

#[test]
fn power_on_encodes_duration_seconds() {
    let ctx = test_context(Some(SessionToken::default()));

    let stay_on = Command::PowerOn { seconds: 0 }.to_frame(&ctx).unwrap();
    assert_eq!(stay_on.len(), CONTROL_FRAME_LEN);
    assert_eq!(stay_on[83], 0x01);
    assert_eq!(&stay_on[85..89], &[0u8; 4]);

    let ten_minutes = Command::PowerOn { seconds: 600 }.to_frame(&ctx).unwrap();
    assert_eq!(&ten_minutes[85..89], &600u32.to_le_bytes());
}

#[test]
fn power_off_encodes_zero_marker_and_duration() {
    let ctx = test_context(Some(SessionToken::default()));
    let frame = Command::PowerOff.to_frame(&ctx).unwrap();
    assert_eq!(frame.len(), CONTROL_FRAME_LEN);
    assert_eq!(&frame[80..83], &[0x01, 0x06, 0x00]);
    assert_eq!(frame[83], 0x00);
    assert_eq!(&frame[85..89], &[0u8; 4]);
}

#[test]
fn set_shutdown_clamps_before_encoding() {
    let ctx = test_context(Some(SessionToken::default()));

    let low = Command::SetDefaultShutdown { seconds: 100 }
        .to_frame(&ctx)
        .unwrap();
    assert_eq!(low.len(), SET_SHUTDOWN_FRAME_LEN);
    assert_eq!(&low[80..83], &[0x04, 0x04, 0x00]);
    assert_eq!(&low[83..87], &MIN_SHUTDOWN_SECONDS.to_le_bytes());

    let high = Command::SetDefaultShutdown { seconds: 999_999 }
        .to_frame(&ctx)
        .unwrap();
    assert_eq!(&high[83..87], &MAX_SHUTDOWN_SECONDS.to_le_bytes());

    let in_range = Command::SetDefaultShutdown { seconds: 7200 }
        .to_frame(&ctx)
        .unwrap();
    assert_eq!(&in_range[83..87], &7200u32.to_le_bytes());
}

#[test]
fn clamp_shutdown_bounds() {
    assert_eq!(clamp_shutdown(100), 3600);
    assert_eq!(clamp_shutdown(999_999), 86_340);
    assert_eq!(clamp_shutdown(7200), 7200);
}

#[test]
fn commands_require_a_token() {
    let ctx = test_context(None);
    for command in [
        Command::QueryStatus,
        Command::PowerOn { seconds: 0 },
        Command::PowerOff,
        Command::SetDefaultShutdown { seconds: 3600 },
    ] {
        assert!(matches!(
            command.to_frame(&ctx),
            Err(SwitcherError::NotLoggedIn)
        ));
    }
}

// --- TCP reply decoding ---

fn sample_status_reply() -> Vec<u8> {
    let mut reply = vec![0u8; STATUS_REPLY_MIN_LEN];
    reply[..2].copy_from_slice(&FRAME_MAGIC);
    reply[REPLY_NAME_OFFSET..REPLY_NAME_OFFSET + 6].copy_from_slice(b"boiler");
    reply[REPLY_STATE_OFFSET..REPLY_STATE_OFFSET + 2].copy_from_slice(&[0x01, 0x00]);
    reply[REPLY_POWER_OFFSET..REPLY_POWER_OFFSET + 2].copy_from_slice(&1500u16.to_le_bytes());
    reply[REPLY_REMAINING_OFFSET..REPLY_REMAINING_OFFSET + 4]
        .copy_from_slice(&1200u32.to_le_bytes());
    reply[REPLY_DEFAULT_SHUTDOWN_OFFSET..REPLY_DEFAULT_SHUTDOWN_OFFSET + 4]
        .copy_from_slice(&3600u32.to_le_bytes());
    reply
}

#[test]
fn status_reply_decodes_documented_offsets() {
    let reply = StatusReply::try_from(Bytes::from(sample_status_reply())).unwrap();
    let status = reply.decode(test_device_id(), Ipv4Addr::new(10, 0, 0, 2));
    assert_eq!(status.name, "boiler");
    assert_eq!(status.state, DeviceState::On);
    assert_eq!(status.power_watts, 1500);
    assert_eq!(status.remaining_seconds, 1200);
    assert_eq!(status.default_shutdown_seconds, 3600);
    assert_eq!(status.id, test_device_id());
    assert_eq!(status.ip, Ipv4Addr::new(10, 0, 0, 2));
}

#[test]
fn status_reply_rejects_short_input() {
    let short = Bytes::from(vec![0xFE, 0xF0, 0x00, 0x00]);
    assert!(matches!(
        StatusReply::try_from(short),
        Err(SwitcherError::InvalidPacket(_))
    ));
}

#[test]
fn login_reply_extracts_token_at_offset_eight() {
    let mut reply = vec![0u8; 16];
    reply[..2].copy_from_slice(&FRAME_MAGIC);
    reply[TOKEN_OFFSET..TOKEN_OFFSET + 4].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
    let token = LoginReply::try_from(Bytes::from(reply)).unwrap().token();
    assert_eq!(token, SessionToken::from_bytes([0xDE, 0xAD, 0xBE, 0xEF]));
}

#[test]
fn login_reply_rejects_short_input() {
    let short = Bytes::from(vec![0xFE, 0xF0, 0x00, 0x00]);
    assert!(matches!(
        LoginReply::try_from(short),
        Err(SwitcherError::InvalidPacket(_))
    ));
}

// --- Discovery filtering ---

#[test]
fn identifier_matching_covers_id_name_and_address() {
    let status = decode_sample();
    let from: SocketAddr = "192.168.1.77:20002".parse().unwrap();

    assert!(identifier_matches(&status, from, "a1b26b"));
    assert!(identifier_matches(&status, from, "kitchen-heater"));
    assert!(identifier_matches(&status, from, "192.168.1.77"));
    assert!(!identifier_matches(&status, from, "nonexistent-id"));
}

// --- Session loopback ---

#[tokio::test]
async fn session_reuses_token_across_commands() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let token = [0xDE, 0xAD, 0xBE, 0xEF];

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut frames = Vec::new();
        let mut buf = vec![0u8; 1024];

        // login exchange
        let n = stream.read(&mut buf).await.unwrap();
        frames.push(buf[..n].to_vec());
        let mut reply = vec![0u8; 16];
        reply[..2].copy_from_slice(&FRAME_MAGIC);
        reply[TOKEN_OFFSET..TOKEN_OFFSET + 4].copy_from_slice(&token);
        stream.write_all(&reply).await.unwrap();

        // two control exchanges
        for _ in 0..2 {
            let n = stream.read(&mut buf).await.unwrap();
            frames.push(buf[..n].to_vec());
            stream.write_all(&[0xFE, 0xF0, 0x00, 0x00]).await.unwrap();
        }
        frames
    });

    let mut device = Switcher::new(test_device_id(), Ipv4Addr::LOCALHOST).with_port(port);
    let mut events = device.events().expect("first take");
    device.turn_on(10).await.unwrap();
    device.turn_off().await.unwrap();
    assert_eq!(
        device.session_token(),
        Some(SessionToken::from_bytes(token))
    );
    device.close();

    let frames = server.await.unwrap();
    assert_eq!(frames.len(), 3, "one login frame, then one per command");
    // the first frame is the only login
    assert_eq!(&frames[0][6..8], &[0xA1, 0x00]);
    assert_eq!(&frames[1][6..8], &[0x01, 0x02]);
    assert_eq!(&frames[2][6..8], &[0x01, 0x02]);
    // both commands carry the identical cached token
    assert_eq!(&frames[1][TOKEN_OFFSET..TOKEN_OFFSET + 4], &token);
    assert_eq!(&frames[2][TOKEN_OFFSET..TOKEN_OFFSET + 4], &token);
    // turn_on(10 minutes) encodes 600 seconds
    assert_eq!(&frames[1][85..89], &600u32.to_le_bytes());

    assert_eq!(
        events.try_recv().unwrap(),
        SwitcherEvent::Ready { id: test_device_id() }
    );
    assert_eq!(
        events.try_recv().unwrap(),
        SwitcherEvent::StateChanged(DeviceState::On)
    );
    assert_eq!(
        events.try_recv().unwrap(),
        SwitcherEvent::StateChanged(DeviceState::Off)
    );
}

#[tokio::test]
async fn session_reconnects_and_resends_cached_token() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let token = [0xCA, 0xFE, 0xF0, 0x0D];

    let server = tokio::spawn(async move {
        // first connection: login plus one command, then close under
        // the client's feet
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 1024];
        stream.read(&mut buf).await.unwrap();
        let mut reply = vec![0u8; 16];
        reply[..2].copy_from_slice(&FRAME_MAGIC);
        reply[TOKEN_OFFSET..TOKEN_OFFSET + 4].copy_from_slice(&token);
        stream.write_all(&reply).await.unwrap();
        stream.read(&mut buf).await.unwrap();
        stream.write_all(&[0xFE, 0xF0, 0x00, 0x00]).await.unwrap();
        drop(stream);

        // second connection: the very first frame must already be a
        // command, not another login
        let (mut stream, _) = listener.accept().await.unwrap();
        let n = stream.read(&mut buf).await.unwrap();
        let frame = buf[..n].to_vec();
        stream.write_all(&[0xFE, 0xF0, 0x00, 0x00]).await.unwrap();
        frame
    });

    let mut device = Switcher::new(test_device_id(), Ipv4Addr::LOCALHOST).with_port(port);
    device.turn_on(0).await.unwrap();

    // the server dropped the connection; this command fails and clears
    // the stream, but the token survives
    let err = device.turn_off().await.unwrap_err();
    assert!(matches!(
        err,
        SwitcherError::Disconnected | SwitcherError::Io(_)
    ));
    assert_eq!(
        device.session_token(),
        Some(SessionToken::from_bytes(token))
    );

    // next command reconnects and reuses the cached token verbatim
    device.turn_off().await.unwrap();

    let frame = server.await.unwrap();
    assert_eq!(&frame[6..8], &[0x01, 0x02]);
    assert_eq!(&frame[TOKEN_OFFSET..TOKEN_OFFSET + 4], &token);
}

#[tokio::test]
async fn query_status_decodes_reply_over_session() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 1024];

        stream.read(&mut buf).await.unwrap();
        let mut login_reply = vec![0u8; 16];
        login_reply[..2].copy_from_slice(&FRAME_MAGIC);
        login_reply[TOKEN_OFFSET..TOKEN_OFFSET + 4].copy_from_slice(&[1, 2, 3, 4]);
        stream.write_all(&login_reply).await.unwrap();

        stream.read(&mut buf).await.unwrap();
        stream.write_all(&sample_status_reply()).await.unwrap();
    });

    let mut device = Switcher::new(test_device_id(), Ipv4Addr::LOCALHOST).with_port(port);
    let status = device.query_status().await.unwrap();
    assert_eq!(status.name, "boiler");
    assert_eq!(status.state, DeviceState::On);
    assert_eq!(status.power_watts, 1500);
    assert_eq!(status.ip, Ipv4Addr::LOCALHOST);

    server.await.unwrap();
}

#[tokio::test]
async fn login_failure_surfaces_and_caches_nothing() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 1024];
        stream.read(&mut buf).await.unwrap();
        // a reply too short to carry a token
        stream.write_all(&[0xFE, 0xF0, 0x00, 0x00]).await.unwrap();
    });

    let mut device = Switcher::new(test_device_id(), Ipv4Addr::LOCALHOST).with_port(port);
    let err = device.turn_on(0).await.unwrap_err();
    assert!(matches!(err, SwitcherError::Login(_)));
    assert_eq!(device.session_token(), None);

    server.await.unwrap();
}

// --- Discovery loopback ---

#[tokio::test(start_paused = true)]
async fn discover_times_out_without_matching_device() {
    let found = discover_on(0, Some("nonexistent-id"), Duration::from_secs(1))
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn discover_finds_matching_device() {
    // fixed port so the sender knows where to aim; only this test uses it
    const PORT: u16 = 42_002;

    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let feeder = tokio::spawn(async move {
        let frame = sample_broadcast();
        for _ in 0..40 {
            let _ = sender.send_to(&frame, ("127.0.0.1", PORT)).await;
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    });

    let found = discover_on(PORT, Some("kitchen-heater"), Duration::from_secs(2))
        .await
        .unwrap()
        .expect("device should be discovered");
    assert_eq!(found.id, test_device_id());
    assert_eq!(found.addr, Ipv4Addr::new(192, 168, 1, 77));
    assert_eq!(found.status.power_watts, 1234);

    feeder.abort();
}

#[tokio::test]
async fn status_listener_emits_decoded_broadcasts() {
    let mut listener = StatusListener::bind_to(0).await.unwrap();
    let port = listener.local_addr().port();

    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    // noise first: wrong length, then a valid broadcast
    sender.send_to(&[0xFE, 0xF0, 0x00], ("127.0.0.1", port)).await.unwrap();
    sender
        .send_to(&sample_broadcast(), ("127.0.0.1", port))
        .await
        .unwrap();

    match listener.recv().await {
        Some(StatusEvent::Status(status)) => {
            assert_eq!(status.name, "kitchen-heater");
            assert_eq!(status.state, DeviceState::On);
        }
        other => panic!("expected a status event, got {other:?}"),
    }
    listener.close();
}
