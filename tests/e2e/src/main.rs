fn main() {
    println!("Run `cargo test -p fileport-e2e` to execute the end-to-end scenarios.");
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::path::Path;
    use std::time::Duration;

    use fileport_client::{ClientConfig, ClientError, FileClient};
    use fileport_protocol::{Status, encode_length, read_status};
    use fileport_server::{FileServer, ServerConfig};
    use fileport_transfer::digest_bytes;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
    use tokio_util::sync::CancellationToken;

    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    struct Running {
        addr: SocketAddr,
        cancel: CancellationToken,
        handle: tokio::task::JoinHandle<()>,
    }

    impl Running {
        async fn stop(self) {
            self.cancel.cancel();
            tokio::time::timeout(Duration::from_secs(5), self.handle)
                .await
                .expect("server did not stop")
                .unwrap();
        }
    }

    fn config(root: &Path) -> ServerConfig {
        ServerConfig {
            bind_addr: ([127, 0, 0, 1], 0).into(),
            storage_root: root.to_path_buf(),
            ..Default::default()
        }
    }

    async fn serve(config: ServerConfig) -> Running {
        let server = FileServer::bind(config).await.unwrap();
        let addr = server.local_addr();
        let cancel = server.shutdown_token();
        let handle = tokio::spawn(async move { server.run().await.unwrap() });
        Running {
            addr,
            cancel,
            handle,
        }
    }

    async fn raw(addr: SocketAddr) -> (BufReader<OwnedReadHalf>, OwnedWriteHalf) {
        let (r, w) = TcpStream::connect(addr).await.unwrap().into_split();
        (BufReader::new(r), w)
    }

    async fn raw_upload(
        r: &mut BufReader<OwnedReadHalf>,
        w: &mut OwnedWriteHalf,
        command: &str,
        body: &[u8],
    ) -> Status {
        w.write_all(command.as_bytes()).await.unwrap();
        match read_status(r).await.unwrap() {
            Status::Ready => {}
            refused => return refused,
        }
        w.write_all(&encode_length(body.len() as u64).unwrap()).await.unwrap();
        w.write_all(body).await.unwrap();
        read_status(r).await.unwrap()
    }

    async fn raw_get(r: &mut BufReader<OwnedReadHalf>, w: &mut OwnedWriteHalf, name: &str, len: usize) -> Vec<u8> {
        w.write_all(format!("GET {name}\n").as_bytes()).await.unwrap();
        let mut buf = vec![0u8; 20 + len];
        r.read_exact(&mut buf).await.unwrap();
        buf
    }

    fn client(addr: SocketAddr, local: &Path) -> FileClient {
        FileClient::new(ClientConfig {
            addr,
            local_dir: local.to_path_buf(),
            ..Default::default()
        })
    }

    /// Names in `dir` that look like in-flight uploads.
    fn temp_files(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".part"))
            .collect()
    }

    #[tokio::test]
    async fn scenario_create_duplicate_and_missing_target() {
        let root = tempfile::tempdir().unwrap();
        let server = serve(config(root.path())).await;
        let (mut r, mut w) = raw(server.addr).await;

        // Create.
        let status = raw_upload(&mut r, &mut w, "NEW report.txt\n", b"abc").await;
        assert_eq!(status.encode(), format!("OK {ABC_SHA256}\n"));
        assert_eq!(
            raw_get(&mut r, &mut w, "report.txt", 3).await,
            b"00000000000000000003abc"
        );

        // Duplicate NEW, on the same connection.
        let status = raw_upload(&mut r, &mut w, "NEW report.txt\n", b"xyz").await;
        assert_eq!(status, Status::error("already exists"));
        assert_eq!(
            raw_get(&mut r, &mut w, "report.txt", 3).await,
            b"00000000000000000003abc"
        );

        // Missing target: refused, nothing created, connection still usable.
        let status = raw_upload(&mut r, &mut w, "PUT ghost.txt\n", b"boo").await;
        assert_eq!(status, Status::error("not found"));
        assert!(!root.path().join("ghost.txt").exists());
        assert_eq!(
            raw_get(&mut r, &mut w, "report.txt", 3).await,
            b"00000000000000000003abc"
        );

        server.stop().await;
    }

    #[tokio::test]
    async fn round_trip_and_repeated_get() {
        let (root, local) = (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap());
        let server = serve(config(root.path())).await;
        let c = client(server.addr, local.path());

        let content: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(local.path().join("data.bin"), &content).unwrap();
        let stored = c.create("data.bin").await.unwrap();
        assert_eq!(stored, digest_bytes(&content));

        std::fs::remove_file(local.path().join("data.bin")).unwrap();
        let first = c.request("data.bin").await.unwrap();
        let second = c.request("data.bin").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.digest, stored);
        assert_eq!(std::fs::read(local.path().join("data.bin")).unwrap(), content);

        server.stop().await;
    }

    #[tokio::test]
    async fn update_then_get_returns_new_content() {
        let (root, local) = (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap());
        std::fs::write(root.path().join("notes.txt"), b"first draft").unwrap();
        let server = serve(config(root.path())).await;
        let c = client(server.addr, local.path());

        std::fs::write(local.path().join("notes.txt"), b"final").unwrap();
        c.update("notes.txt").await.unwrap();

        std::fs::remove_file(local.path().join("notes.txt")).unwrap();
        let outcome = c.request("notes.txt").await.unwrap();
        assert_eq!(outcome.bytes, 5);
        assert_eq!(std::fs::read(local.path().join("notes.txt")).unwrap(), b"final");

        server.stop().await;
    }

    #[tokio::test]
    async fn disconnect_mid_upload_leaves_no_trace() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("keep.txt"), b"original").unwrap();
        let server = serve(config(root.path())).await;

        for command in ["NEW fresh.txt\n", "PUT keep.txt\n"] {
            let (mut r, mut w) = raw(server.addr).await;
            w.write_all(command.as_bytes()).await.unwrap();
            assert_eq!(read_status(&mut r).await.unwrap(), Status::Ready);
            w.write_all(&encode_length(1_000u64).unwrap()).await.unwrap();
            w.write_all(&[7u8; 100]).await.unwrap();
            drop((r, w));
        }

        // Give the handlers time to notice the disconnects.
        tokio::time::sleep(Duration::from_millis(100)).await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while !temp_files(root.path()).is_empty() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("temporary files left behind");

        assert!(!root.path().join("fresh.txt").exists());
        assert_eq!(std::fs::read(root.path().join("keep.txt")).unwrap(), b"original");

        server.stop().await;
    }

    #[tokio::test]
    async fn concurrent_gets_see_identical_content() {
        let root = tempfile::tempdir().unwrap();
        let content: Vec<u8> = (0..50_000u32).map(|i| (i * 7 % 256) as u8).collect();
        std::fs::write(root.path().join("shared.bin"), &content).unwrap();
        let server = serve(config(root.path())).await;

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let local = tempfile::tempdir().unwrap();
            let c = client(server.addr, local.path());
            tasks.push(tokio::spawn(async move {
                let outcome = c.request("shared.bin").await.unwrap();
                let bytes = std::fs::read(local.path().join("shared.bin")).unwrap();
                (outcome, bytes)
            }));
        }

        let expected = digest_bytes(&content);
        for task in tasks {
            let (outcome, bytes) = task.await.unwrap();
            assert_eq!(outcome.digest, expected);
            assert_eq!(bytes, content);
        }

        server.stop().await;
    }

    #[tokio::test]
    async fn concurrent_creates_to_distinct_names() {
        let (root, local) = (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap());
        let server = serve(config(root.path())).await;

        let mut tasks = Vec::new();
        for i in 0..12 {
            let name = format!("part-{i}.txt");
            std::fs::write(local.path().join(&name), format!("part {i}")).unwrap();
            let c = client(server.addr, local.path());
            tasks.push(tokio::spawn(async move { c.create(&name).await }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        for i in 0..12 {
            let stored = std::fs::read_to_string(root.path().join(format!("part-{i}.txt"))).unwrap();
            assert_eq!(stored, format!("part {i}"));
        }

        server.stop().await;
    }

    #[tokio::test]
    async fn binary_payload_ending_in_eof_marker() {
        let (root, local) = (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap());
        let server = serve(config(root.path())).await;
        let c = client(server.addr, local.path());

        let mut content = vec![0u8, 255, 10, 13, 0];
        content.extend_from_slice(b"EOF");
        std::fs::write(local.path().join("tricky.bin"), &content).unwrap();

        c.create("tricky.bin").await.unwrap();
        assert_eq!(std::fs::read(root.path().join("tricky.bin")).unwrap(), content);

        std::fs::remove_file(local.path().join("tricky.bin")).unwrap();
        c.request("tricky.bin").await.unwrap();
        assert_eq!(std::fs::read(local.path().join("tricky.bin")).unwrap(), content);

        server.stop().await;
    }

    #[tokio::test]
    async fn waiting_client_is_served_when_a_slot_frees() {
        let (root, local) = (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap());
        std::fs::write(root.path().join("a.txt"), b"a").unwrap();
        let server = serve(ServerConfig {
            max_connections: 1,
            ..config(root.path())
        })
        .await;

        let (mut r, mut w) = raw(server.addr).await;
        raw_get(&mut r, &mut w, "a.txt", 1).await;

        let c = client(server.addr, local.path());
        let waiting = tokio::spawn(async move { c.request("a.txt").await });
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!waiting.is_finished());

        drop((r, w));
        let outcome = tokio::time::timeout(Duration::from_secs(5), waiting)
            .await
            .expect("waiting client never served")
            .unwrap()
            .unwrap();
        assert_eq!(outcome.bytes, 1);

        server.stop().await;
    }

    #[tokio::test]
    async fn idle_connection_is_closed() {
        let root = tempfile::tempdir().unwrap();
        let server = serve(ServerConfig {
            idle_timeout: Some(Duration::from_millis(200)),
            ..config(root.path())
        })
        .await;

        let mut stream = TcpStream::connect(server.addr).await.unwrap();
        let mut buf = [0u8; 1];
        let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .expect("idle connection was not closed")
            .unwrap();
        assert_eq!(n, 0);

        server.stop().await;
    }

    #[tokio::test]
    async fn client_reports_refusals() {
        let (root, local) = (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap());
        let server = serve(config(root.path())).await;
        let c = client(server.addr, local.path());

        let err = c.request("missing.txt").await.unwrap_err();
        assert!(matches!(err, ClientError::Rejected(ref m) if m == "not found"));

        std::fs::write(local.path().join("ghost.txt"), b"boo").unwrap();
        let err = c.update("ghost.txt").await.unwrap_err();
        assert!(matches!(err, ClientError::Rejected(ref m) if m == "not found"));

        server.stop().await;
    }
}
