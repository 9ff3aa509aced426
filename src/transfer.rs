// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Attachment transfer: download to staging, re-upload in parts.
//!
//! # Upload Protocol
//!
//! The whole staged file is hashed (SHA-256) once, then sent as sequential
//! multipart requests of at most `part_size` bytes. Every part carries the
//! same manifest:
//!
//! ```text
//! uploadId   fileName   hash   totalSize   totalParts
//! partIndex (0-based)   partSize   file (bytes, media type, encoding)
//! ```
//!
//! The first part that is not answered with a success status aborts the
//! transfer; remaining parts are not sent and failed parts are not retried
//! within the run. Re-running uploads the file again under the same id.
//!
//! A zero-length file has zero parts: nothing is sent and the transfer
//! counts as successful.

use crate::client::{RemoteStoreClient, AUTH_HEADER};
use crate::design::DesignType;
use crate::error::{ReplicationError, Result};
use crate::metrics;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

const HASH_BUF_SIZE: usize = 64 * 1024;

/// Transfer encoding tag sent with each uploaded part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Plain filesystem files.
    Binary,
    /// Design files.
    Identity,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Binary => "binary",
            Encoding::Identity => "identity",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one file being uploaded; identical for every part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentManifest {
    pub upload_id: String,
    pub file_name: String,
    /// Lowercase hex SHA-256 of the whole file.
    pub hash: String,
    pub total_size: u64,
    pub total_parts: u64,
}

impl AttachmentManifest {
    /// Hash `path` and derive the part count for `part_size`.
    pub async fn for_file(upload_id: &str, file_name: &str, path: &Path, part_size: usize) -> Result<Self> {
        let (hash, total_size) = hash_file(path).await?;
        Ok(Self {
            upload_id: upload_id.to_string(),
            file_name: file_name.to_string(),
            hash,
            total_size,
            total_parts: part_count(total_size, part_size),
        })
    }

    fn form(&self, index: u64, bytes: Vec<u8>, media_type: &str, encoding: Encoding) -> Result<Form> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Content-Transfer-Encoding",
            HeaderValue::from_static(encoding.as_str()),
        );
        let part_size = bytes.len();
        let file = Part::bytes(bytes)
            .file_name(self.file_name.clone())
            .mime_str(media_type)?
            .headers(headers);

        Ok(Form::new()
            .text("uploadId", self.upload_id.clone())
            .text("fileName", self.file_name.clone())
            .text("hash", self.hash.clone())
            .text("totalSize", self.total_size.to_string())
            .text("partIndex", index.to_string())
            .text("totalParts", self.total_parts.to_string())
            .text("partSize", part_size.to_string())
            .part("file", file))
    }
}

/// Number of parts needed for `total_size` bytes.
pub fn part_count(total_size: u64, part_size: usize) -> u64 {
    let part_size = part_size.max(1) as u64;
    total_size.div_ceil(part_size)
}

/// SHA-256 (hex) and size of a file.
pub async fn hash_file(path: &Path) -> Result<(String, u64)> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BUF_SIZE];
    let mut total = 0u64;
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok((hex::encode(hasher.finalize()), total))
}

/// `true` when `name` is one plain path component: no separators, no
/// `.`/`..`, not absolute.
pub fn is_plain_file_name(name: &str) -> bool {
    if name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(first)), None) if first == name
    )
}

/// Read up to `buf.len()` bytes, stopping early only at end of file.
async fn read_part(file: &mut File, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

async fn write_body(resp: reqwest::Response, dest: &Path) -> Result<u64> {
    let mut file = File::create(dest).await?;
    let mut stream = resp.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

/// Moves attachment payloads between sites through a local staging dir.
#[derive(Debug, Clone)]
pub struct AttachmentTransfer {
    http: reqwest::Client,
    staging_dir: PathBuf,
    part_size: usize,
}

impl AttachmentTransfer {
    pub fn new(http: reqwest::Client, staging_dir: impl Into<PathBuf>, part_size: usize) -> Self {
        Self {
            http,
            staging_dir: staging_dir.into(),
            part_size: part_size.max(1),
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn part_size(&self) -> usize {
        self.part_size
    }

    /// Stream `url` into `<staging_dir>/<staged_name>`.
    ///
    /// Anything but `200 OK` is a [`ReplicationError::Remote`].
    /// `staged_name` must be a plain file name. A download that fails
    /// midway leaves nothing behind in the staging dir.
    pub async fn download(&self, url: &str, headers: &[(&str, &str)], staged_name: &str) -> Result<PathBuf> {
        if !is_plain_file_name(staged_name) {
            return Err(ReplicationError::invalid_object(
                staged_name,
                "attachment name is not a plain file name",
            ));
        }
        tokio::fs::create_dir_all(&self.staging_dir).await?;
        let dest = self.staging_dir.join(staged_name);

        let mut req = self.http.get(url);
        for (name, value) in headers {
            req = req.header(*name, *value);
        }
        let resp = req.send().await?;
        if resp.status() != StatusCode::OK {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ReplicationError::remote(status, url, body));
        }

        match write_body(resp, &dest).await {
            Ok(written) => {
                debug!(url, path = %dest.display(), bytes = written, "Downloaded attachment");
                Ok(dest)
            }
            Err(e) => {
                warn!(url, error = %e, "Attachment download interrupted");
                self.discard(&dest).await;
                Err(e)
            }
        }
    }

    /// Upload a staged file to `dest_url` in parts.
    ///
    /// Returns [`ReplicationError::TransferFailed`] for the first rejected
    /// part; no further parts are sent after it.
    #[allow(clippy::too_many_arguments)]
    pub async fn upload_multipart(
        &self,
        dest_url: &str,
        upload_id: &str,
        path: &Path,
        file_name: &str,
        media_type: &str,
        encoding: Encoding,
        auth_token: &str,
    ) -> Result<AttachmentManifest> {
        let manifest = AttachmentManifest::for_file(upload_id, file_name, path, self.part_size).await?;

        if manifest.total_parts == 0 {
            warn!(upload_id, file_name, "Empty attachment, nothing to upload");
            return Ok(manifest);
        }

        self.send_parts(dest_url, &manifest, path, media_type, encoding, auth_token).await?;

        info!(
            upload_id,
            file_name,
            bytes = manifest.total_size,
            parts = manifest.total_parts,
            "Uploaded attachment"
        );
        Ok(manifest)
    }

    /// Send the parts of `path` described by `manifest`, in order.
    ///
    /// The file must still hold `manifest.total_parts` parts; running out
    /// early is an [`std::io::ErrorKind::UnexpectedEof`] error.
    async fn send_parts(
        &self,
        dest_url: &str,
        manifest: &AttachmentManifest,
        path: &Path,
        media_type: &str,
        encoding: Encoding,
        auth_token: &str,
    ) -> Result<()> {
        let upload_id = manifest.upload_id.as_str();
        let mut file = File::open(path).await?;
        let mut buf = vec![0u8; self.part_size];
        for index in 0..manifest.total_parts {
            let n = read_part(&mut file, &mut buf).await?;
            if n == 0 {
                return Err(ReplicationError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!(
                        "{} shrank while uploading: part {} of {} is empty",
                        path.display(),
                        index,
                        manifest.total_parts
                    ),
                )));
            }
            let form = manifest.form(index, buf[..n].to_vec(), media_type, encoding)?;
            let resp = self
                .http
                .post(dest_url)
                .header(AUTH_HEADER, auth_token)
                .multipart(form)
                .send()
                .await?;

            if !resp.status().is_success() {
                let status = resp.status().as_u16();
                warn!(
                    upload_id,
                    part = index,
                    total_parts = manifest.total_parts,
                    status,
                    "Attachment part rejected, aborting transfer"
                );
                return Err(ReplicationError::TransferFailed {
                    upload_id: upload_id.to_string(),
                    part: index as usize,
                    status,
                });
            }
            metrics::record_part_uploaded(encoding.as_str(), n);
        }
        Ok(())
    }

    /// Download a filesystem file from `source` and upload it to
    /// `destination` under the same UUID.
    pub async fn relocate_file(
        &self,
        source: &RemoteStoreClient,
        destination: &RemoteStoreClient,
        uuid: &str,
        file_name: &str,
        media_type: &str,
    ) -> Result<AttachmentManifest> {
        let url = source.resolve_file_url(uuid).await?;
        let staged = self.download(&url, &[], uuid).await?;
        let result = self
            .upload_multipart(
                &destination.file_upload_url(uuid)?,
                uuid,
                &staged,
                file_name,
                media_type,
                Encoding::Binary,
                destination.token(),
            )
            .await;
        self.discard(&staged).await;
        result
    }

    /// Download a design file from `source` in the given particular format
    /// and upload it to `destination` under the same UUID.
    pub async fn relocate_design_file(
        &self,
        source: &RemoteStoreClient,
        destination: &RemoteStoreClient,
        uuid: &str,
        design_type: DesignType,
    ) -> Result<AttachmentManifest> {
        let url = source.design_file_url(uuid, design_type.particular())?;
        let staged = self
            .download(&url, &[(AUTH_HEADER, source.token())], &design_type.file_name(uuid))
            .await?;
        let result = self
            .upload_multipart(
                &destination.design_upload_url(uuid)?,
                uuid,
                &staged,
                &design_type.file_name(uuid),
                design_type.media_type(),
                Encoding::Identity,
                destination.token(),
            )
            .await;
        self.discard(&staged).await;
        result
    }

    async fn discard(&self, staged: &Path) {
        if let Err(e) = tokio::fs::remove_file(staged).await {
            debug!(path = %staged.display(), error = %e, "Could not remove staged file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transfer(dir: &Path, part_size: usize) -> AttachmentTransfer {
        AttachmentTransfer::new(reqwest::Client::new(), dir, part_size)
    }

    #[test]
    fn test_part_count() {
        assert_eq!(part_count(0, 10), 0);
        assert_eq!(part_count(1, 10), 1);
        assert_eq!(part_count(10, 10), 1);
        assert_eq!(part_count(11, 10), 2);
        assert_eq!(part_count(25 * 1024 * 1024, 10 * 1024 * 1024), 3);
    }

    #[tokio::test]
    async fn test_hash_file_known_value() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("abc");
        tokio::fs::write(&p, b"abc").await.unwrap();
        let (hash, size) = hash_file(&p).await.unwrap();
        assert_eq!(size, 3);
        assert_eq!(
            hash,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_download_creates_staging_dir() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blob"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("nested").join("site");
        let t = transfer(&staging, 4);
        let p = t.download(&format!("{}/blob", server.uri()), &[], "U1").await.unwrap();
        assert_eq!(tokio::fs::read(&p).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_download_requires_200() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blob"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let err = transfer(dir.path(), 4)
            .download(&format!("{}/blob", server.uri()), &[], "U1")
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(202));
    }

    #[tokio::test]
    async fn test_upload_sends_every_part() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .and(header(AUTH_HEADER, "dest-token"))
            .respond_with(ResponseTemplate::new(200))
            .expect(3)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("f");
        tokio::fs::write(&p, b"0123456789").await.unwrap();

        let manifest = transfer(dir.path(), 4)
            .upload_multipart(
                &format!("{}/upload", server.uri()),
                "U1",
                &p,
                "f.bin",
                "application/octet-stream",
                Encoding::Binary,
                "dest-token",
            )
            .await
            .unwrap();
        assert_eq!(manifest.total_parts, 3);
        assert_eq!(manifest.total_size, 10);

        let requests = server.received_requests().await.unwrap();
        for (i, req) in requests.iter().enumerate() {
            let body = String::from_utf8_lossy(&req.body).to_ascii_lowercase();
            assert!(body.contains(&manifest.hash));
            assert!(body.contains(&format!("name=\"partindex\"\r\n\r\n{}\r\n", i)));
            assert!(body.contains("content-transfer-encoding: binary"));
        }
    }

    #[tokio::test]
    async fn test_upload_aborts_on_first_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(200))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("f");
        tokio::fs::write(&p, vec![7u8; 20]).await.unwrap();

        let err = transfer(dir.path(), 4)
            .upload_multipart(
                &format!("{}/upload", server.uri()),
                "U1",
                &p,
                "f",
                "application/octet-stream",
                Encoding::Binary,
                "t",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ReplicationError::TransferFailed { part: 1, status: 500, .. }));
        // Part 0 succeeded, part 1 failed, parts 2..4 never sent.
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_file_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("empty");
        tokio::fs::write(&p, b"").await.unwrap();

        let manifest = transfer(dir.path(), 4)
            .upload_multipart(
                &format!("{}/upload", server.uri()),
                "U0",
                &p,
                "empty",
                "application/octet-stream",
                Encoding::Binary,
                "t",
            )
            .await
            .unwrap();
        assert_eq!(manifest.total_parts, 0);
    }

    #[test]
    fn test_plain_file_names() {
        assert!(is_plain_file_name("5f0c2a9e-1b2c-11ef-9a3b-0242ac120002"));
        assert!(is_plain_file_name("U1.tn3"));
        assert!(!is_plain_file_name(""));
        assert!(!is_plain_file_name("."));
        assert!(!is_plain_file_name(".."));
        assert!(!is_plain_file_name("../victim"));
        assert!(!is_plain_file_name("a/b"));
        assert!(!is_plain_file_name("/etc/passwd"));
        assert!(!is_plain_file_name("..\\victim"));
    }

    #[tokio::test]
    async fn test_download_rejects_names_outside_staging() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec()))
            .expect(0)
            .mount(&server)
            .await;

        let root = tempfile::tempdir().unwrap();
        let victim = root.path().join("victim");
        tokio::fs::write(&victim, b"precious").await.unwrap();

        let err = transfer(&root.path().join("staging"), 4)
            .download(&format!("{}/blob", server.uri()), &[], "../victim")
            .await
            .unwrap_err();
        assert!(matches!(err, ReplicationError::InvalidObject { .. }));
        assert_eq!(tokio::fs::read(&victim).await.unwrap(), b"precious");
    }

    #[tokio::test]
    async fn test_interrupted_download_leaves_nothing_staged() {
        use tokio::net::TcpListener;

        // Promises 100 bytes, sends 10, hangs up.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut req = [0u8; 1024];
            let _ = sock.read(&mut req).await;
            sock.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n0123456789")
                .await
                .unwrap();
            sock.shutdown().await.unwrap();
        });

        let dir = tempfile::tempdir().unwrap();
        let t = transfer(dir.path(), 4);
        assert!(t.download(&format!("http://{}/blob", addr), &[], "U1").await.is_err());
        assert!(!dir.path().join("U1").exists());
    }

    #[tokio::test]
    async fn test_file_shrinking_after_hash_fails_upload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("f");
        tokio::fs::write(&p, b"0123456789").await.unwrap();
        let t = transfer(dir.path(), 4);
        let manifest = AttachmentManifest::for_file("U1", "f", &p, 4).await.unwrap();
        assert_eq!(manifest.total_parts, 3);
        tokio::fs::write(&p, b"0123").await.unwrap();

        let err = t
            .send_parts(
                &format!("{}/upload", server.uri()),
                &manifest,
                &p,
                "application/octet-stream",
                Encoding::Binary,
                "t",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ReplicationError::Io(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[test]
    fn test_encoding_tags() {
        assert_eq!(Encoding::Binary.to_string(), "binary");
        assert_eq!(Encoding::Identity.to_string(), "identity");
    }
}
