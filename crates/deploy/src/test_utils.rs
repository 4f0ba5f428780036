//! Local stand-ins for the JSON-RPC node, the block explorer and the artifacts directory.

use std::{path::Path, sync::Arc};

use serde_json::{Value, json};
use tempdir::TempDir;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use url::Url;

use crate::artifact::ArtifactStore;

/// An HTTP request received by [`serve`].
#[derive(Debug, Clone)]
pub(crate) struct StubRequest {
    /// Path and query string.
    pub target: String,
    pub body: String,
}

/// Answer every HTTP request with the JSON returned by `handler`, on a local port.
pub(crate) async fn serve<F>(handler: F) -> Url
where
    F: Fn(StubRequest) -> Value + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let handler = handler.clone();
            tokio::spawn(async move {
                let Ok(request) = read_request(&mut stream).await else {
                    return;
                };
                let body = (*handler)(request).to_string();
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    url
}

/// Answer JSON-RPC calls with the result `handler` returns for the method and params.
pub(crate) async fn serve_json_rpc<F>(handler: F) -> Url
where
    F: Fn(&str, &[Value]) -> Value + Send + Sync + 'static,
{
    serve(move |request| {
        let call: Value = serde_json::from_str(&request.body).unwrap();
        let method = call["method"].as_str().unwrap_or_default();
        let params = call["params"].as_array().cloned().unwrap_or_default();

        json!({
            "jsonrpc": "2.0",
            "id": call["id"],
            "result": handler(method, &params),
        })
    })
    .await
}

async fn read_request(stream: &mut TcpStream) -> std::io::Result<StubRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break end;
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let body_start = header_end + 4;
    while buf.len() < body_start + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    Ok(StubRequest {
        target: head.split_whitespace().nth(1).unwrap_or("/").to_string(),
        body: String::from_utf8_lossy(&buf[body_start..]).to_string(),
    })
}

fn write(path: &Path, value: Value) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
}

/// An artifacts directory holding `NFTManager(address _nft)`, compiled with solc 0.6.2.
pub(crate) fn artifact_store() -> (TempDir, ArtifactStore) {
    let dir = TempDir::new("taiyaki-artifacts").unwrap();
    let root = dir.path().to_path_buf();

    write(
        &root.join("contracts/NFTManager.sol/NFTManager.json"),
        json!({
            "_format": "hh-sol-artifact-1",
            "contractName": "NFTManager",
            "sourceName": "contracts/NFTManager.sol",
            "abi": [{
                "type": "constructor",
                "inputs": [{"name": "_nft", "type": "address", "internalType": "address"}],
                "stateMutability": "nonpayable"
            }],
            "bytecode": "0x6080604052",
            "deployedBytecode": "0x6080",
            "linkReferences": {},
            "deployedLinkReferences": {}
        }),
    );
    write(
        &root.join("contracts/NFTManager.sol/NFTManager.dbg.json"),
        json!({"_format": "hh-sol-dbg-1", "buildInfo": "../../build-info/b1.json"}),
    );
    write(
        &root.join("build-info/b1.json"),
        json!({
            "id": "b1",
            "_format": "hh-sol-build-info-1",
            "solcVersion": "0.6.2",
            "solcLongVersion": "0.6.2+commit.bacdbe57",
            "input": {"language": "Solidity", "sources": {}},
            "output": {}
        }),
    );

    (dir, ArtifactStore::new(root))
}
