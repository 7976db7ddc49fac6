// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use car_core::{FlowEvent, RunId};

#[test]
fn request_serde_round_trip() {
    let requests = vec![
        Request::Ping,
        Request::Bootstrap {
            repo_id: RepoId::new("demo"),
        },
        Request::Archive {
            repo_id: RepoId::new("demo"),
            run_id: RunId::new("r-1"),
            force: true,
        },
        Request::TargetsAdd {
            target_ref: "chat:telegram:123".to_string(),
        },
        Request::PmaDeliver {
            id: "t1".to_string(),
            text: "hello".to_string(),
            is_dispatch: false,
        },
        Request::Shutdown,
    ];
    for request in requests {
        let bytes = encode(&request).unwrap();
        let back: Request = decode(&bytes).unwrap();
        assert_eq!(back, request);
    }
}

#[test]
fn response_error_carries_tag() {
    let response = Response::error("no tickets", Some("precondition_failed"));
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["type"], "Error");
    assert_eq!(json["detail"], "no tickets");
    assert_eq!(json["error"], "precondition_failed");
}

#[tokio::test]
async fn wire_round_trip() {
    let (mut client, mut server) = tokio::io::duplex(4096);

    let request = Request::Hello {
        version: "1.0".to_string(),
    };
    write_message(&mut client, &encode(&request).unwrap())
        .await
        .unwrap();

    let bytes = read_message(&mut server).await.unwrap();
    let received: Request = decode(&bytes).unwrap();
    assert_eq!(received, request);
}

#[tokio::test]
async fn closed_connection_is_reported() {
    let (client, mut server) = tokio::io::duplex(64);
    drop(client);
    let err = read_message(&mut server).await.unwrap_err();
    assert!(matches!(err, ProtocolError::ConnectionClosed));
}

#[tokio::test]
async fn oversized_length_prefix_rejected() {
    let (mut client, mut server) = tokio::io::duplex(64);
    tokio::io::AsyncWriteExt::write_all(
        &mut client,
        &((MAX_MESSAGE_SIZE as u32 + 1).to_be_bytes()),
    )
    .await
    .unwrap();
    let err = read_message(&mut server).await.unwrap_err();
    assert!(matches!(err, ProtocolError::MessageTooLarge { .. }));
}

#[tokio::test]
async fn event_frames_round_trip() {
    let (mut client, mut server) = tokio::io::duplex(4096);
    let event = FlowEvent::FlowStarted {
        run_id: RunId::new("r-1"),
        timestamp: 42,
    };
    write_event(&mut client, &event).await.unwrap();
    let bytes = read_message(&mut server).await.unwrap();
    let received: FlowEvent = decode(&bytes).unwrap();
    assert_eq!(received, event);
}
