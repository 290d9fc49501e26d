//! In-process memcached stand-in for integration tests.
//!
//! Speaks enough of the text and binary protocols for the client's verbs,
//! picking the protocol per connection from the first byte. Every
//! connection runs on its own thread against a shared store.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream, UdpSocket};
use std::os::unix::net::UnixListener;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::thread;

use bytes::BytesMut;
use protocol_memcache::StoreVerb;
use protocol_memcache::binary::{
    BinaryReply, HEADER_SIZE, Opcode, RequestHeader, ResponseHeader, Status,
};

/// Route client logs to the test output; `RUST_LOG=memring=debug` to see them.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    flags: u32,
    cas: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreResult {
    Stored,
    NotStored,
    Exists,
    NotFound,
}

#[derive(Debug, Default)]
struct Store {
    items: HashMap<Vec<u8>, Entry>,
    next_cas: u64,
}

impl Store {
    fn apply(
        &mut self,
        verb: StoreVerb,
        key: &[u8],
        value: &[u8],
        flags: u32,
        cas: u64,
    ) -> StoreResult {
        let exists = self.items.get(key);
        match verb {
            StoreVerb::Add if exists.is_some() => return StoreResult::NotStored,
            StoreVerb::Replace | StoreVerb::Append | StoreVerb::Prepend if exists.is_none() => {
                return StoreResult::NotStored;
            }
            StoreVerb::Cas => match exists {
                None => return StoreResult::NotFound,
                Some(entry) if entry.cas != cas => return StoreResult::Exists,
                Some(_) => {}
            },
            // Binary set with a cas is a compare-and-swap.
            StoreVerb::Set if cas != 0 => match exists {
                None => return StoreResult::NotFound,
                Some(entry) if entry.cas != cas => return StoreResult::Exists,
                Some(_) => {}
            },
            _ => {}
        }

        self.next_cas += 1;
        let cas = self.next_cas;
        let entry = match (verb, self.items.remove(key)) {
            (StoreVerb::Append, Some(mut old)) => {
                old.value.extend_from_slice(value);
                Entry { cas, ..old }
            }
            (StoreVerb::Prepend, Some(old)) => {
                let mut joined = value.to_vec();
                joined.extend_from_slice(&old.value);
                Entry {
                    value: joined,
                    cas,
                    ..old
                }
            }
            _ => Entry {
                value: value.to_vec(),
                flags,
                cas,
            },
        };
        self.items.insert(key.to_vec(), entry);
        StoreResult::Stored
    }

    /// `None` for a missing key, `Some(Err)` for a non-numeric value.
    fn arith(&mut self, key: &[u8], incr: bool, delta: u64) -> Option<Result<u64, ()>> {
        let entry = self.items.get_mut(key)?;
        let Some(current) = std::str::from_utf8(&entry.value)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        else {
            return Some(Err(()));
        };
        let next = if incr {
            current.wrapping_add(delta)
        } else {
            current.saturating_sub(delta)
        };
        entry.value = next.to_string().into_bytes();
        self.next_cas += 1;
        entry.cas = self.next_cas;
        Some(Ok(next))
    }
}

/// Mock server options.
#[derive(Debug, Clone, Default)]
pub struct MockOptions {
    /// Require SASL PLAIN with these credentials on binary connections.
    pub auth: Option<(String, String)>,
}

struct Shared {
    store: Mutex<Store>,
    accepted: AtomicUsize,
    commands: AtomicUsize,
    stop: AtomicBool,
    options: MockOptions,
}

pub struct MockServer {
    shared: Arc<Shared>,
    port: u16,
    path: Option<PathBuf>,
}

impl MockServer {
    pub fn start() -> Self {
        Self::start_with(MockOptions::default())
    }

    pub fn start_with(options: MockOptions) -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let shared = Self::shared(options);
        let accept_shared = Arc::clone(&shared);
        thread::spawn(move || {
            for stream in listener.incoming() {
                if accept_shared.stop.load(Ordering::SeqCst) {
                    break;
                }
                let Ok(stream) = stream else { continue };
                accept_shared.accepted.fetch_add(1, Ordering::SeqCst);
                let conn_shared = Arc::clone(&accept_shared);
                thread::spawn(move || {
                    let writer = match stream.try_clone() {
                        Ok(w) => w,
                        Err(_) => return,
                    };
                    let _ = serve(BufReader::new(stream), writer, &conn_shared);
                });
            }
        });
        MockServer {
            shared,
            port,
            path: None,
        }
    }

    /// Listen on a unix socket in the temp directory.
    pub fn start_unix(name: &str) -> Self {
        init_tracing();
        let path = std::env::temp_dir().join(format!("memring-{}-{name}.sock", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).unwrap();
        let shared = Self::shared(MockOptions::default());
        let accept_shared = Arc::clone(&shared);
        thread::spawn(move || {
            for stream in listener.incoming() {
                if accept_shared.stop.load(Ordering::SeqCst) {
                    break;
                }
                let Ok(stream) = stream else { continue };
                accept_shared.accepted.fetch_add(1, Ordering::SeqCst);
                let conn_shared = Arc::clone(&accept_shared);
                thread::spawn(move || {
                    let writer = match stream.try_clone() {
                        Ok(w) => w,
                        Err(_) => return,
                    };
                    let _ = serve(BufReader::new(stream), writer, &conn_shared);
                });
            }
        });
        MockServer {
            shared,
            port: 0,
            path: Some(path),
        }
    }

    fn shared(options: MockOptions) -> Arc<Shared> {
        Arc::new(Shared {
            store: Mutex::new(Store::default()),
            accepted: AtomicUsize::new(0),
            commands: AtomicUsize::new(0),
            stop: AtomicBool::new(false),
            options,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &str {
        self.path
            .as_deref()
            .and_then(|p| p.to_str())
            .unwrap()
    }

    /// Connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.shared.accepted.load(Ordering::SeqCst)
    }

    /// Commands processed so far.
    pub fn commands(&self) -> usize {
        self.shared.commands.load(Ordering::SeqCst)
    }

    pub fn value(&self, key: &[u8]) -> Option<Vec<u8>> {
        let store = self.shared.store.lock().unwrap();
        store.items.get(key).map(|e| e.value.clone())
    }

    pub fn remove(&self, key: &[u8]) {
        self.shared.store.lock().unwrap().items.remove(key);
    }

    pub fn len(&self) -> usize {
        self.shared.store.lock().unwrap().items.len()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        match &self.path {
            Some(path) => {
                let _ = std::os::unix::net::UnixStream::connect(path);
                let _ = std::fs::remove_file(path);
            }
            None => {
                let _ = TcpStream::connect(("127.0.0.1", self.port));
            }
        }
    }
}

/// A port nothing listens on.
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// UDP socket that collects datagrams.
pub fn udp_sink() -> (UdpSocket, u16) {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket
        .set_read_timeout(Some(std::time::Duration::from_secs(2)))
        .unwrap();
    let port = socket.local_addr().unwrap().port();
    (socket, port)
}

fn serve<R: Read, W: Write>(mut reader: BufReader<R>, mut writer: W, shared: &Shared) -> io::Result<()> {
    let first = match reader.fill_buf()?.first() {
        Some(&b) => b,
        None => return Ok(()),
    };
    if first == 0x80 {
        serve_binary(reader, writer, shared)
    } else {
        serve_text(&mut reader, &mut writer, shared)
    }
}

// ── Text ─────────────────────────────────────────────────────────────

fn serve_text<R: Read, W: Write>(reader: &mut BufReader<R>, writer: &mut W, shared: &Shared) -> io::Result<()> {
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(());
        }
        shared.commands.fetch_add(1, Ordering::SeqCst);
        let tokens: Vec<&str> = line.split_ascii_whitespace().collect();
        let Some(&command) = tokens.first() else {
            writer.write_all(b"ERROR\r\n")?;
            continue;
        };
        let noreply = tokens.last() == Some(&"noreply");
        let mut out = Vec::new();

        match command {
            "get" | "gets" => {
                let store = shared.store.lock().unwrap();
                for key in &tokens[1..] {
                    if let Some(entry) = store.items.get(key.as_bytes()) {
                        if command == "gets" {
                            write!(out, "VALUE {key} {} {} {}\r\n", entry.flags, entry.value.len(), entry.cas)?;
                        } else {
                            write!(out, "VALUE {key} {} {}\r\n", entry.flags, entry.value.len())?;
                        }
                        out.extend_from_slice(&entry.value);
                        out.extend_from_slice(b"\r\n");
                    }
                }
                out.extend_from_slice(b"END\r\n");
            }
            "set" | "add" | "replace" | "append" | "prepend" | "cas" => {
                let verb = match command {
                    "set" => StoreVerb::Set,
                    "add" => StoreVerb::Add,
                    "replace" => StoreVerb::Replace,
                    "append" => StoreVerb::Append,
                    "prepend" => StoreVerb::Prepend,
                    _ => StoreVerb::Cas,
                };
                let flags: u32 = tokens[2].parse().unwrap_or(0);
                let len: usize = tokens[4].parse().unwrap_or(0);
                let cas: u64 = if verb == StoreVerb::Cas {
                    tokens[5].parse().unwrap_or(0)
                } else {
                    0
                };
                let mut data = vec![0u8; len + 2];
                reader.read_exact(&mut data)?;
                let result = shared.store.lock().unwrap().apply(
                    verb,
                    tokens[1].as_bytes(),
                    &data[..len],
                    flags,
                    cas,
                );
                out.extend_from_slice(match result {
                    StoreResult::Stored => b"STORED\r\n".as_slice(),
                    StoreResult::NotStored => b"NOT_STORED\r\n",
                    StoreResult::Exists => b"EXISTS\r\n",
                    StoreResult::NotFound => b"NOT_FOUND\r\n",
                });
            }
            "delete" => {
                let removed = shared
                    .store
                    .lock()
                    .unwrap()
                    .items
                    .remove(tokens[1].as_bytes())
                    .is_some();
                out.extend_from_slice(if removed {
                    b"DELETED\r\n".as_slice()
                } else {
                    b"NOT_FOUND\r\n"
                });
            }
            "incr" | "decr" => {
                let delta: u64 = tokens[2].parse().unwrap_or(0);
                let result = shared.store.lock().unwrap().arith(
                    tokens[1].as_bytes(),
                    command == "incr",
                    delta,
                );
                match result {
                    Some(Ok(value)) => write!(out, "{value}\r\n")?,
                    Some(Err(())) => out.extend_from_slice(
                        b"CLIENT_ERROR cannot increment or decrement non-numeric value\r\n",
                    ),
                    None => out.extend_from_slice(b"NOT_FOUND\r\n"),
                }
            }
            "touch" => {
                let found = shared
                    .store
                    .lock()
                    .unwrap()
                    .items
                    .contains_key(tokens[1].as_bytes());
                out.extend_from_slice(if found {
                    b"TOUCHED\r\n".as_slice()
                } else {
                    b"NOT_FOUND\r\n"
                });
            }
            "flush_all" => {
                shared.store.lock().unwrap().items.clear();
                out.extend_from_slice(b"OK\r\n");
            }
            "version" => out.extend_from_slice(b"VERSION 1.6.0-mock\r\n"),
            "quit" => return Ok(()),
            _ => out.extend_from_slice(b"ERROR\r\n"),
        }

        if !noreply {
            writer.write_all(&out)?;
        }
    }
}

// ── Binary ───────────────────────────────────────────────────────────

fn reply(
    out: &mut BytesMut,
    request: &RequestHeader,
    status: Status,
    extras: &[u8],
    key: &[u8],
    value: &[u8],
    cas: u64,
) {
    let mut header = ResponseHeader::new(request.opcode, status);
    header.opaque = request.opaque;
    header.cas = cas;
    BinaryReply {
        header,
        extras,
        key,
        value,
    }
    .encode(out);
}

fn serve_binary<R: Read, W: Write>(mut reader: BufReader<R>, mut writer: W, shared: &Shared) -> io::Result<()> {
    let mut authenticated = shared.options.auth.is_none();
    loop {
        let mut raw = [0u8; HEADER_SIZE];
        if reader.read_exact(&mut raw).is_err() {
            return Ok(());
        }
        let request = RequestHeader::parse(&raw)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        let mut body = vec![0u8; request.total_body_length as usize];
        reader.read_exact(&mut body)?;
        shared.commands.fetch_add(1, Ordering::SeqCst);

        let extras_len = usize::from(request.extras_length);
        let key_end = extras_len + usize::from(request.key_length);
        let extras = &body[..extras_len];
        let key = &body[extras_len..key_end];
        let value = &body[key_end..];
        let quiet = request.opcode.is_quiet();
        let opcode = request.opcode.to_non_quiet();
        let mut out = BytesMut::new();

        let sasl = matches!(
            opcode,
            Opcode::SaslListMechs | Opcode::SaslAuth | Opcode::SaslStep
        );
        if !authenticated && !sasl {
            reply(&mut out, &request, Status::AuthError, &[], &[], b"Auth failure", 0);
            writer.write_all(&out)?;
            continue;
        }

        match opcode {
            Opcode::Get | Opcode::GetK => {
                let store = shared.store.lock().unwrap();
                match store.items.get(key) {
                    Some(entry) => {
                        let echoed = if opcode == Opcode::GetK { key } else { &[][..] };
                        reply(
                            &mut out,
                            &request,
                            Status::NoError,
                            &entry.flags.to_be_bytes(),
                            echoed,
                            &entry.value,
                            entry.cas,
                        );
                    }
                    None if !quiet => {
                        reply(&mut out, &request, Status::KeyNotFound, &[], &[], b"Not found", 0)
                    }
                    None => {}
                }
            }
            Opcode::Set | Opcode::Add | Opcode::Replace | Opcode::Append | Opcode::Prepend => {
                let verb = match opcode {
                    Opcode::Set => StoreVerb::Set,
                    Opcode::Add => StoreVerb::Add,
                    Opcode::Replace => StoreVerb::Replace,
                    Opcode::Append => StoreVerb::Append,
                    _ => StoreVerb::Prepend,
                };
                let flags = extras
                    .first_chunk::<4>()
                    .map(|b| u32::from_be_bytes(*b))
                    .unwrap_or(0);
                let result =
                    shared
                        .store
                        .lock()
                        .unwrap()
                        .apply(verb, key, value, flags, request.cas);
                let status = match result {
                    StoreResult::Stored => Status::NoError,
                    StoreResult::NotStored if verb == StoreVerb::Add => Status::KeyExists,
                    StoreResult::NotStored if verb == StoreVerb::Replace => Status::KeyNotFound,
                    StoreResult::NotStored => Status::ItemNotStored,
                    StoreResult::Exists => Status::KeyExists,
                    StoreResult::NotFound => Status::KeyNotFound,
                };
                if !(quiet && status == Status::NoError) {
                    reply(&mut out, &request, status, &[], &[], &[], 0);
                }
            }
            Opcode::Delete => {
                let removed = shared.store.lock().unwrap().items.remove(key).is_some();
                let status = if removed {
                    Status::NoError
                } else {
                    Status::KeyNotFound
                };
                if !(quiet && removed) {
                    reply(&mut out, &request, status, &[], &[], &[], 0);
                }
            }
            Opcode::Increment | Opcode::Decrement => {
                let delta = u64::from_be_bytes(extras[..8].try_into().unwrap());
                let initial = u64::from_be_bytes(extras[8..16].try_into().unwrap());
                let exptime = u32::from_be_bytes(extras[16..20].try_into().unwrap());
                let mut store = shared.store.lock().unwrap();
                let result = match store.arith(key, opcode == Opcode::Increment, delta) {
                    None if exptime != 0xffff_ffff => {
                        store.apply(
                            StoreVerb::Set,
                            key,
                            initial.to_string().as_bytes(),
                            0,
                            0,
                        );
                        Some(Ok(initial))
                    }
                    other => other,
                };
                drop(store);
                match result {
                    Some(Ok(n)) if !quiet => {
                        reply(&mut out, &request, Status::NoError, &[], &[], &n.to_be_bytes(), 0)
                    }
                    Some(Ok(_)) => {}
                    Some(Err(())) => {
                        reply(&mut out, &request, Status::NonNumericValue, &[], &[], &[], 0)
                    }
                    None => reply(&mut out, &request, Status::KeyNotFound, &[], &[], &[], 0),
                }
            }
            Opcode::Touch => {
                let found = shared.store.lock().unwrap().items.contains_key(key);
                let status = if found {
                    Status::NoError
                } else {
                    Status::KeyNotFound
                };
                reply(&mut out, &request, status, &[], &[], &[], 0);
            }
            Opcode::Flush => {
                shared.store.lock().unwrap().items.clear();
                if !quiet {
                    reply(&mut out, &request, Status::NoError, &[], &[], &[], 0);
                }
            }
            Opcode::Noop => reply(&mut out, &request, Status::NoError, &[], &[], &[], 0),
            Opcode::Version => {
                reply(&mut out, &request, Status::NoError, &[], &[], b"1.6.0-mock", 0)
            }
            Opcode::Quit => {
                if !quiet {
                    reply(&mut out, &request, Status::NoError, &[], &[], &[], 0);
                    writer.write_all(&out)?;
                }
                return Ok(());
            }
            Opcode::SaslListMechs => {
                reply(&mut out, &request, Status::NoError, &[], &[], b"PLAIN", 0)
            }
            Opcode::SaslAuth | Opcode::SaslStep => {
                let expected = shared.options.auth.as_ref().map(|(user, pass)| {
                    let mut token = vec![0u8];
                    token.extend_from_slice(user.as_bytes());
                    token.push(0);
                    token.extend_from_slice(pass.as_bytes());
                    token
                });
                if key == b"PLAIN" && expected.as_deref().is_none_or(|t| t == value) {
                    authenticated = true;
                    reply(&mut out, &request, Status::NoError, &[], &[], b"Authenticated", 0);
                } else {
                    reply(&mut out, &request, Status::AuthError, &[], &[], b"Auth failure", 0);
                }
            }
            _ => reply(&mut out, &request, Status::UnknownCommand, &[], &[], &[], 0),
        }

        if !out.is_empty() {
            writer.write_all(&out)?;
        }
    }
}
