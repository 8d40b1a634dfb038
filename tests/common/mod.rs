//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use gatehouse::config::ServerConfig;
use gatehouse::{Server, ServerError, Shutdown};

pub const RULES: &str = r#"{
    "Allow": ["index.html", "public.html", "page.html", "login.html", "docs/*"],
    "Forbidden": ["*"],
    "Exception": [{ "Username": "alice", "Files": ["secret.html"] }],
    "Database": "users.keys",
    "Handler": { "login.html": "login.sh", "page.html": "page.sh" }
}"#;

/// Accepts alice/wonderland with a redirect, rejects anything else with a
/// page of its own.
pub const LOGIN_SCRIPT: &str = r#"user=""; pass=""
while [ $# -gt 0 ]; do
    case "$1" in
        --username) user="$2"; shift 2 ;;
        --password) pass="$2"; shift 2 ;;
        *) shift ;;
    esac
done
if [ "$user" = "alice" ] && [ "$pass" = "wonderland" ]; then
    printf 'HTTP/1.1 302 Verified\r\nLocation: /secret.html\r\nContent-Length: 0\r\n\r\n'
else
    printf 'HTTP/1.1 403 Rejected\r\nContent-Length: 8\r\nContent-Type: text/html\r\n\r\nrejected'
fi
"#;

/// Answers only when called with `--dynamic`.
pub const PAGE_SCRIPT: &str = r#"if [ "$1" = "--dynamic" ]; then
    printf 'HTTP/1.1 200 OK\r\nContent-Length: 7\r\n\r\ndynamic'
fi
"#;

/// A temporary document root with pages, rules, credentials and handlers.
///
/// The root is `<tempdir>/www`, so the temp directory itself is "outside".
pub struct Site {
    pub dir: tempfile::TempDir,
    pub root: PathBuf,
}

impl Site {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap().join("www");
        std::fs::create_dir_all(root.join("docs")).unwrap();

        let site = Self { dir, root };
        site.outside("outside.txt", "outside");
        site.write("index.html", "<h1>index</h1>");
        site.write("public.html", "public");
        site.write("page.html", "static page");
        site.write("login.html", "login form");
        site.write("secret.html", "secret");
        site.write("docs/readme.txt", "readme");
        site.write("users.keys", "bob\nbuilder\nalice\nwonderland\n");
        site.write("login.sh", LOGIN_SCRIPT);
        site.write("page.sh", PAGE_SCRIPT);
        site.write("rules.json", RULES);
        site
    }

    pub fn write(&self, relative: &str, contents: &str) {
        std::fs::write(self.root.join(relative), contents).unwrap();
    }

    pub fn outside(&self, name: &str, contents: &str) {
        std::fs::write(self.dir.path().join(name), contents).unwrap();
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// A configuration serving this site on an ephemeral port with short
    /// timeouts.
    pub fn config(&self) -> ServerConfig {
        let mut config = ServerConfig::default();
        config.server.root = self.root.clone();
        config.server.port = 0;
        config.connection.read_timeout_ms = 50;
        config.connection.accept_timeout_ms = 50;
        config
    }
}

/// A server running in the background.
pub struct Running {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<(), ServerError>>,
}

impl Running {
    pub async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.unwrap()
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the accept loop to finish.
    pub async fn stop(self) -> Result<(), ServerError> {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("server did not stop")
            .unwrap()
    }
}

pub async fn start(config: ServerConfig) -> Running {
    let server = Server::new(config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    let handle = tokio::spawn(server.run(listener, receiver));
    Running {
        addr,
        shutdown,
        handle,
    }
}

/// A parsed response as seen on the wire.
#[derive(Debug)]
pub struct RawResponse {
    pub head: String,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn status(&self) -> u16 {
        self.head
            .split(' ')
            .nth(1)
            .and_then(|code| code.parse().ok())
            .unwrap()
    }

    pub fn status_line(&self) -> &str {
        self.head.lines().next().unwrap_or("")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.eq_ignore_ascii_case(name).then(|| value.trim())
        })
    }

    /// The head without the `Date` header, for comparing responses.
    pub fn head_without_date(&self) -> String {
        self.head
            .lines()
            .filter(|line| !line.starts_with("Date:"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Read exactly one response from `stream`. HEAD responses carry no body.
pub async fn read_response<S>(stream: &mut S, head_only: bool) -> RawResponse
where
    S: AsyncRead + Unpin,
{
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).await.unwrap();
        assert!(n > 0, "connection closed before response head");
        head.push(byte[0]);
    }

    let mut response = RawResponse {
        head: String::from_utf8(head).unwrap(),
        body: Vec::new(),
    };
    if !head_only {
        let length = response
            .header("Content-Length")
            .map(|value| value.parse::<usize>().unwrap())
            .unwrap_or(0);
        response.body = vec![0u8; length];
        stream.read_exact(&mut response.body).await.unwrap();
    }
    response
}

/// Send `request` on a new connection and read one response.
pub async fn exchange(running: &Running, request: &str) -> RawResponse {
    let head_only = request.starts_with("HEAD ");
    let mut stream = running.connect().await;
    stream.write_all(request.as_bytes()).await.unwrap();
    tokio::time::timeout(Duration::from_secs(10), read_response(&mut stream, head_only))
        .await
        .expect("no response")
}

pub fn get(path: &str) -> String {
    format!("GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", path)
}

pub fn post(path: &str, body: &str) -> String {
    format!(
        "POST {} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{}",
        path,
        body.len(),
        body
    )
}

/// Write a self-signed certificate for `localhost` next to the root and
/// enable TLS in `config`. Returns the certificate to trust.
pub fn enable_tls(site: &Site, config: &mut ServerConfig) -> rcgen::Certificate {
    let rcgen::CertifiedKey { cert, signing_key } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert_path = site.dir.path().join("signed.crt");
    let key_path = site.dir.path().join("signed.private.key");
    std::fs::write(&cert_path, cert.pem()).unwrap();
    std::fs::write(&key_path, signing_key.serialize_pem()).unwrap();

    config.tls.enabled = true;
    config.tls.cert_path = cert_path;
    config.tls.key_path = key_path;
    cert
}

pub fn read_file(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}
