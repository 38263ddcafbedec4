//! A scripted V8 debug agent on a local TCP socket.

use std::collections::HashMap;
use std::net::SocketAddr;

use jsmirror_wire::{codec, Envelope};
use serde_json::{Map, Value};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

/// Serves one client: sends the connect greeting, then answers `lookup`
/// requests from `handles`. Requests for `silent` commands get no reply.
pub async fn spawn(handles: HashMap<u64, Value>, silent: &'static [&'static str]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut read = BufReader::new(read);
        write
            .write_all(b"Type: connect\r\nV8-Version: 3.14.5.9\r\nProtocol-Version: 1\r\nEmbedding-Host: node v0.10.48\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();

        let mut seq = 100;
        while let Ok(Some(frame)) = codec::read_frame(&mut read).await {
            let request = codec::decode_envelope(&frame.body).unwrap();
            let command = request.command.clone().unwrap_or_default();
            if silent.contains(&command.as_str()) {
                continue;
            }

            let body = match command.as_str() {
                "lookup" => {
                    let mut body = Map::new();
                    let requested = request.arguments.as_ref().unwrap()["handles"]
                        .as_array()
                        .unwrap()
                        .clone();
                    for handle in requested {
                        let handle = handle.as_u64().unwrap();
                        if let Some(payload) = handles.get(&handle) {
                            body.insert(handle.to_string(), payload.clone());
                        }
                    }
                    Some(Value::Object(body))
                }
                _ => None,
            };
            seq += 1;
            let reply = Envelope {
                seq,
                ..Envelope::response(request.seq, &command, true, body)
            };
            let bytes = codec::encode_message(&reply).unwrap();
            if write.write_all(&bytes).await.is_err() {
                break;
            }
        }
    });

    addr
}
