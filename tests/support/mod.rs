#![allow(dead_code)]

use bytes::{Buf, BufMut, BytesMut};
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use parking_lot::Mutex;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use tokio_postgres::{Client, NoTls, SimpleQueryMessage};

use pgswitch::{Config, DecisionDispatcher, Server, config::LogLevel, gateway::GatewayPools};

pub const BACKEND_PASSWORD: &str = "backend-secret";

pub const USERS: &str = r#"
    [[users]]
    username = "alice"
    password = "hunter2"

    [[users]]
    username = "bob"
    password = "opensesame"
    pooler_mode = "transaction"
"#;

// -----------------------------------------------------------------------------
// ----- Fake server pools -----------------------------------------------------

/// A minimal Postgres lookalike. Every statement, simple or extended, is
/// answered with one row `(dbkey, query text as received)`, so tests can see
/// both where a statement went and what it looked like on arrival.
pub struct FakeBackend {
    pub dbkey: String,
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
}

impl FakeBackend {
    pub async fn start(dbkey: &str) -> FakeBackend {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));

        let name = dbkey.to_string();
        let log = Arc::clone(&received);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let name = name.clone();
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    let _ = serve_backend(stream, name, log).await;
                });
            }
        });

        FakeBackend {
            dbkey: dbkey.to_string(),
            addr,
            received,
        }
    }

    /// Statement texts received (Query and Parse), session resets excluded.
    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }

    pub fn pool_entry(&self) -> String {
        format!(
            r#"
            [[pools]]
            dbkey = "{}"
            host = "127.0.0.1"
            port = {}
            user = "app"
            password = "{BACKEND_PASSWORD}"
            "#,
            self.dbkey,
            self.addr.port()
        )
    }
}

async fn serve_backend(
    mut stream: TcpStream,
    dbkey: String,
    log: Arc<Mutex<Vec<String>>>,
) -> std::io::Result<()> {
    let mut buf = BytesMut::with_capacity(1024);

    // StartupMessage
    let len = read_frame(&mut stream, &mut buf, false).await?;
    buf.advance(len);

    let mut out = BytesMut::new();
    auth_request(&mut out, 3);
    stream.write_all(&out).await?;
    out.clear();

    // PasswordMessage
    let len = read_frame(&mut stream, &mut buf, true).await?;
    let password = cstr(&buf[5..len]);
    buf.advance(len);
    if password != BACKEND_PASSWORD {
        error_response(&mut out, "28P01", "bad backend password");
        stream.write_all(&out).await?;
        return Ok(());
    }

    auth_request(&mut out, 0);
    parameter_status(&mut out, "server_version", "16.0");
    ready(&mut out, b'I');
    stream.write_all(&out).await?;
    out.clear();

    let mut in_transaction = false;
    let mut statements: HashMap<String, String> = HashMap::new();
    let mut portals: HashMap<String, String> = HashMap::new();
    loop {
        let len = match read_frame(&mut stream, &mut buf, true).await {
            Ok(len) => len,
            Err(_) => return Ok(()),
        };
        let tag = buf[0];
        let body = buf[5..len].to_vec();
        buf.advance(len);

        match tag {
            b'X' => return Ok(()),
            b'Q' => {
                let query = cstr(&body);
                if !is_reset(&query) {
                    log.lock().push(query.clone());
                }
                execute(&mut out, &dbkey, &query, &mut in_transaction, true);
                ready(&mut out, if in_transaction { b'T' } else { b'I' });
            }
            b'P' => {
                let name = cstr(&body);
                let query = cstr(&body[name.len() + 1..]);
                log.lock().push(query.clone());
                statements.insert(name, query);
                frame(&mut out, b'1', &[]);
            }
            b'B' => {
                let portal = cstr(&body);
                let statement = cstr(&body[portal.len() + 1..]);
                let query = statements.get(&statement).cloned().unwrap_or_default();
                portals.insert(portal, query);
                frame(&mut out, b'2', &[]);
            }
            b'D' => {
                let name = cstr(&body[1..]);
                if body[0] == b'S' {
                    frame(&mut out, b't', &0i16.to_be_bytes());
                }
                let query = match body[0] {
                    b'S' => statements.get(&name),
                    _ => portals.get(&name),
                };
                if query.is_some_and(|q| returns_rows(q)) {
                    row_description(&mut out, &["dbkey", "query"]);
                } else {
                    frame(&mut out, b'n', &[]);
                }
            }
            b'E' => {
                let portal = cstr(&body);
                let query = portals.get(&portal).cloned().unwrap_or_default();
                execute(&mut out, &dbkey, &query, &mut in_transaction, false);
            }
            b'C' => {
                let name = cstr(&body[1..]);
                match body[0] {
                    b'S' => statements.remove(&name),
                    _ => portals.remove(&name),
                };
                frame(&mut out, b'3', &[]);
            }
            b'H' => {}
            b'S' => {
                portals.remove("");
                ready(&mut out, if in_transaction { b'T' } else { b'I' });
            }
            _ => {
                error_response(&mut out, "0A000", "unsupported message");
                ready(&mut out, b'I');
            }
        }

        if !out.is_empty() {
            stream.write_all(&out).await?;
            out.clear();
        }
    }
}

fn is_reset(query: &str) -> bool {
    normalized(query) == "discard all"
}

fn returns_rows(query: &str) -> bool {
    !matches!(
        normalized(query).as_str(),
        "discard all" | "begin" | "commit" | "rollback"
    )
}

fn normalized(query: &str) -> String {
    query.trim().trim_end_matches(';').to_ascii_lowercase()
}

// Writes the response to one statement. Extended execution already sent its
// RowDescription while describing.
fn execute(
    out: &mut BytesMut,
    dbkey: &str,
    query: &str,
    in_transaction: &mut bool,
    describe: bool,
) {
    match normalized(query).as_str() {
        "discard all" => command_complete(out, "DISCARD ALL"),
        "begin" => {
            *in_transaction = true;
            command_complete(out, "BEGIN");
        }
        "commit" | "rollback" => {
            *in_transaction = false;
            command_complete(out, "COMMIT");
        }
        _ => {
            if describe {
                row_description(out, &["dbkey", "query"]);
            }
            data_row(out, &[dbkey, query]);
            command_complete(out, "SELECT 1");
        }
    }
}

async fn read_frame(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
    tagged: bool,
) -> std::io::Result<usize> {
    let prefix = usize::from(tagged);
    loop {
        if buf.len() >= prefix + 4 {
            let declared =
                u32::from_be_bytes([buf[prefix], buf[prefix + 1], buf[prefix + 2], buf[prefix + 3]]);
            let total = prefix + declared as usize;
            if buf.len() >= total {
                return Ok(total);
            }
        }
        if stream.read_buf(buf).await? == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
    }
}

fn cstr(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn frame(out: &mut BytesMut, tag: u8, body: &[u8]) {
    out.put_u8(tag);
    out.put_u32(4 + body.len() as u32);
    out.extend_from_slice(body);
}

fn auth_request(out: &mut BytesMut, code: i32) {
    frame(out, b'R', &code.to_be_bytes());
}

fn parameter_status(out: &mut BytesMut, name: &str, value: &str) {
    let mut body = BytesMut::new();
    body.extend_from_slice(name.as_bytes());
    body.put_u8(0);
    body.extend_from_slice(value.as_bytes());
    body.put_u8(0);
    frame(out, b'S', &body);
}

fn ready(out: &mut BytesMut, status: u8) {
    frame(out, b'Z', &[status]);
}

fn command_complete(out: &mut BytesMut, tag: &str) {
    let mut body = BytesMut::new();
    body.extend_from_slice(tag.as_bytes());
    body.put_u8(0);
    frame(out, b'C', &body);
}

fn error_response(out: &mut BytesMut, code: &str, message: &str) {
    let mut body = BytesMut::new();
    for (field, value) in [(b'S', "ERROR"), (b'C', code), (b'M', message)] {
        body.put_u8(field);
        body.extend_from_slice(value.as_bytes());
        body.put_u8(0);
    }
    body.put_u8(0);
    frame(out, b'E', &body);
}

fn row_description(out: &mut BytesMut, columns: &[&str]) {
    let mut body = BytesMut::new();
    body.put_i16(columns.len() as i16);
    for name in columns {
        body.extend_from_slice(name.as_bytes());
        body.put_u8(0);
        body.put_i32(0); // table oid
        body.put_i16(0); // attnum
        body.put_i32(25); // text
        body.put_i16(-1);
        body.put_i32(-1);
        body.put_i16(0); // text format
    }
    frame(out, b'T', &body);
}

fn data_row(out: &mut BytesMut, values: &[&str]) {
    let mut body = BytesMut::new();
    body.put_i16(values.len() as i16);
    for value in values {
        body.put_i32(value.len() as i32);
        body.extend_from_slice(value.as_bytes());
    }
    frame(out, b'D', &body);
}

// -----------------------------------------------------------------------------
// ----- Proxy -----------------------------------------------------------------

pub struct Proxy {
    pub addr: SocketAddr,
    pub backends: Vec<FakeBackend>,
}

impl Proxy {
    /// Starts one fake server per dbkey and a proxy in front of them.
    /// `extra` is appended to the generated pgswitch.toml.
    pub async fn start(dbkeys: &[&str], extra: &str) -> Proxy {
        Self::start_with(dbkeys, extra, None).await
    }

    pub async fn start_with(
        dbkeys: &[&str],
        extra: &str,
        dispatcher: Option<DecisionDispatcher>,
    ) -> Proxy {
        let mut backends = Vec::with_capacity(dbkeys.len());
        for dbkey in dbkeys {
            backends.push(FakeBackend::start(dbkey).await);
        }

        let mut raw: String = backends.iter().map(FakeBackend::pool_entry).collect();
        raw.push_str(extra);

        let config = Config::from_toml(
            "127.0.0.1:0".parse().unwrap(),
            LogLevel::Debug,
            &raw,
            USERS,
        )
        .expect("test config should parse");

        let mut server = Server::new(Arc::new(config));
        if let Some(dispatcher) = dispatcher {
            server = server.with_dispatcher(dispatcher);
        }

        let listener = server.bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let _ = server.serve(listener, std::future::pending()).await;
        });

        Proxy { addr, backends }
    }

    pub fn backend(&self, dbkey: &str) -> &FakeBackend {
        self.backends
            .iter()
            .find(|b| b.dbkey == dbkey)
            .expect("unknown fake backend")
    }

    pub async fn connect(
        &self,
        user: &str,
        password: &str,
        dbname: &str,
    ) -> Result<Client, tokio_postgres::Error> {
        let conn_str = format!(
            "host={} port={} user={user} password={password} dbname={dbname}",
            self.addr.ip(),
            self.addr.port()
        );

        let (client, connection) = tokio_postgres::connect(&conn_str, NoTls).await?;
        tokio::spawn(async move {
            let _ = connection.await;
        });

        Ok(client)
    }
}

// -----------------------------------------------------------------------------
// ----- Helpers ---------------------------------------------------------------

/// Runs a simple query and returns `(dbkey, query as received)` from the
/// fake server that answered it.
pub async fn answered_by(client: &Client, query: &str) -> (String, String) {
    let messages = client.simple_query(query).await.expect("query should succeed");

    let row = messages
        .iter()
        .find_map(|msg| match msg {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .expect("expected a row");

    (
        row.get(0).expect("dbkey present").to_string(),
        row.get(1).expect("query present").to_string(),
    )
}

// -----------------------------------------------------------------------------
// ----- Raw client ------------------------------------------------------------

/// Builds one tagged client message.
pub fn message(tag: u8, body: &[u8]) -> BytesMut {
    let mut out = BytesMut::new();
    frame(&mut out, tag, body);
    out
}

pub fn simple_query(query: &str) -> BytesMut {
    let mut body = BytesMut::from(query.as_bytes());
    body.put_u8(0);
    message(b'Q', &body)
}

/// Logs in over a bare socket and returns once the proxy reports
/// ReadyForQuery. For pipelining that tokio-postgres does not expose.
pub async fn raw_session(proxy: &Proxy, user: &str, password: &str, dbname: &str) -> TcpStream {
    let mut stream = TcpStream::connect(proxy.addr).await.unwrap();

    let mut params = BytesMut::new();
    params.put_i32(196608);
    for (key, value) in [("user", user), ("database", dbname)] {
        params.extend_from_slice(key.as_bytes());
        params.put_u8(0);
        params.extend_from_slice(value.as_bytes());
        params.put_u8(0);
    }
    params.put_u8(0);
    let mut startup = BytesMut::new();
    startup.put_u32(4 + params.len() as u32);
    startup.extend_from_slice(&params);
    stream.write_all(&startup).await.unwrap();

    let mut buf = BytesMut::new();
    let tags = read_until_ready(&mut stream, &mut buf, b'R').await;
    assert_eq!(tags, vec![b'R']);

    let mut body = BytesMut::from(password.as_bytes());
    body.put_u8(0);
    stream.write_all(&message(b'p', &body)).await.unwrap();

    read_until_ready(&mut stream, &mut buf, b'Z').await;
    stream
}

/// Reads tagged server frames until one tagged `stop` arrives, returning the
/// tags seen. Returns early when the server closes the socket.
pub async fn read_until_ready(stream: &mut TcpStream, buf: &mut BytesMut, stop: u8) -> Vec<u8> {
    let mut tags = Vec::new();
    while let Ok(len) = read_frame(stream, buf, true).await {
        let tag = buf[0];
        buf.advance(len);
        tags.push(tag);
        if tag == stop {
            break;
        }
    }
    tags
}

// -----------------------------------------------------------------------------
// ----- Pools -----------------------------------------------------------------

/// Fake servers plus the gateway pools in front of them, without a proxy.
pub async fn pools(dbkeys: &[&str]) -> (Vec<FakeBackend>, Arc<GatewayPools>) {
    let mut backends = Vec::with_capacity(dbkeys.len());
    for dbkey in dbkeys {
        backends.push(FakeBackend::start(dbkey).await);
    }

    let raw: String = backends.iter().map(FakeBackend::pool_entry).collect();
    let config = Config::from_toml("127.0.0.1:0".parse().unwrap(), LogLevel::Debug, &raw, USERS)
        .expect("test config should parse");

    (backends, Arc::new(GatewayPools::new(&config.pools)))
}

pub fn idle_in(pools: &GatewayPools, dbkey: &str) -> usize {
    pools
        .snapshot()
        .into_iter()
        .find(|stats| stats.dbkey == dbkey)
        .map(|stats| stats.idle)
        .expect("unknown pool")
}
