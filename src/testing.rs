//! In-memory doubles for the engine and SFTP seams (tests only)

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::sftp::{RemoteAttrs, RemoteEntry, SftpBackend};
use crate::ssh::bridge::{BridgeSocket, ShutdownWrite};
use crate::ssh::engine::{
    EngineChannel, EngineSession, PtyRequest, SessionOptions, SshEngine, Transport,
};
use crate::ssh::error::SshError;

const CLIENT_BANNER: &[u8] = b"SSH-2.0-mock-client\r\n";
const SERVER_BANNER: &[u8] = b"SSH-2.0-mock-server\r\n";

/// Ordered record of every call made on the doubles
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.lock().iter().filter(|e| *e == event).count()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.0.lock().iter().position(|e| e == event)
    }
}

#[derive(Debug, Default)]
struct ChannelInner {
    inbound: VecDeque<u8>,
    written: Vec<u8>,
    write_limit: Option<usize>,
    eof: bool,
    closed: bool,
}

/// Channel double; clones share state so tests can feed a live channel
#[derive(Debug, Clone)]
pub struct MockChannel {
    name: String,
    log: EventLog,
    inner: Arc<Mutex<ChannelInner>>,
    /// Writes wait until this channel's inbound bytes have been drained
    write_gate: Option<Box<MockChannel>>,
}

impl MockChannel {
    pub fn new(name: &str, log: EventLog) -> Self {
        Self {
            name: name.to_string(),
            log,
            inner: Arc::default(),
            write_gate: None,
        }
    }

    pub fn push_inbound(&self, data: &[u8]) {
        self.inner.lock().inbound.extend(data.iter().copied());
    }

    pub fn pending_inbound(&self) -> usize {
        self.inner.lock().inbound.len()
    }

    pub fn written(&self) -> Vec<u8> {
        self.inner.lock().written.clone()
    }

    /// Remote side sent EOF
    pub fn peer_eof(&self) {
        self.inner.lock().eof = true;
    }

    fn event(&self, what: &str) {
        self.log.push(format!("{}.{}", self.name, what));
    }
}

impl EngineChannel for MockChannel {
    fn read_nonblocking(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.event("read");
        let mut inner = self.inner.lock();
        let n = buf.len().min(inner.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(inner.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.event("write");
        if let Some(gate) = &self.write_gate {
            let deadline = Instant::now() + Duration::from_secs(2);
            while gate.pending_inbound() > 0 {
                if Instant::now() > deadline {
                    return Err(io::ErrorKind::TimedOut.into());
                }
                thread::sleep(Duration::from_millis(1));
            }
        }
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        let n = inner.write_limit.map_or(data.len(), |l| l.min(data.len()));
        inner.written.extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn send_eof(&mut self) -> io::Result<()> {
        self.event("eof");
        Ok(())
    }

    fn close(&mut self) {
        let mut inner = self.inner.lock();
        if !inner.closed {
            inner.closed = true;
            drop(inner);
            self.event("close");
        }
    }

    fn resize(&mut self, cols: u32, rows: u32) -> io::Result<()> {
        self.event("resize");
        if cols == 0 || rows == 0 {
            return Err(io::ErrorKind::InvalidInput.into());
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.inner.lock().closed
    }

    fn is_eof(&self) -> bool {
        self.inner.lock().eof
    }
}

/// Bridge double with scripted reads and optionally short writes
#[derive(Debug)]
pub struct ScriptedBridge {
    log: EventLog,
    inbound: VecDeque<u8>,
    written: Vec<u8>,
    write_limit: Option<usize>,
    closed: bool,
    broken: bool,
}

impl ScriptedBridge {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            inbound: VecDeque::new(),
            written: Vec::new(),
            write_limit: None,
            closed: false,
            broken: false,
        }
    }

    pub fn write_limit(mut self, limit: usize) -> Self {
        self.write_limit = Some(limit);
        self
    }

    /// Reads report end of stream once the scripted bytes run out
    pub fn closed(mut self) -> Self {
        self.closed = true;
        self
    }

    /// Reads fail as if the local socket was reset
    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }

    pub fn push_inbound(&mut self, data: &[u8]) {
        self.inbound.extend(data.iter().copied());
    }

    pub fn written(&self) -> &[u8] {
        &self.written
    }
}

impl Read for ScriptedBridge {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.log.push("bridge.read");
        if self.broken {
            return Err(io::ErrorKind::ConnectionReset.into());
        }
        if self.inbound.is_empty() {
            return if self.closed {
                Ok(0)
            } else {
                Err(io::ErrorKind::WouldBlock.into())
            };
        }
        let n = buf.len().min(self.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl ShutdownWrite for ScriptedBridge {
    fn shutdown_write(&mut self) -> io::Result<()> {
        self.log.push("bridge.shutdown");
        Ok(())
    }
}

impl Write for ScriptedBridge {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.log.push("bridge.write");
        let n = self.write_limit.map_or(data.len(), |l| l.min(data.len()));
        self.written.extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// How a scripted host behaves
#[derive(Debug, Clone)]
pub struct HostScript {
    unreachable: bool,
    accept_keys: bool,
    password: Option<String>,
    refuse_forward: bool,
    refuse_shell: bool,
    bridged_handshake: bool,
    shell_writes_need_pump: bool,
    fs: Option<MemoryFs>,
}

impl Default for HostScript {
    fn default() -> Self {
        Self {
            unreachable: false,
            accept_keys: true,
            password: None,
            refuse_forward: false,
            refuse_shell: false,
            bridged_handshake: false,
            shell_writes_need_pump: false,
            fs: None,
        }
    }
}

impl HostScript {
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn reject_keys(mut self) -> Self {
        self.accept_keys = false;
        self
    }

    /// The only password the host accepts
    pub fn password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub fn refuse_forward(mut self) -> Self {
        self.refuse_forward = true;
        self
    }

    pub fn refuse_shell(mut self) -> Self {
        self.refuse_shell = true;
        self
    }

    /// When reached over a bridge, exchange banners through it. Only
    /// completes if something pumps the bridge meanwhile.
    pub fn bridged_handshake(mut self) -> Self {
        self.bridged_handshake = true;
        self
    }

    /// Shell writes stall until the forwarded channel has been drained,
    /// like a send window that only reopens once the tunnel is pumped
    pub fn shell_writes_need_pump(mut self) -> Self {
        self.shell_writes_need_pump = true;
        self
    }

    pub fn sftp(mut self, fs: MemoryFs) -> Self {
        self.fs = Some(fs);
        self
    }
}

/// Engine double routing sessions to scripted hosts
#[derive(Debug, Clone)]
pub struct MockEngine {
    log: EventLog,
    hosts: HashMap<String, HostScript>,
    channels: Arc<Mutex<HashMap<String, MockChannel>>>,
}

impl MockEngine {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            hosts: HashMap::new(),
            channels: Arc::default(),
        }
    }

    pub fn host(mut self, name: &str, script: HostScript) -> Self {
        self.hosts.insert(name.to_string(), script);
        self
    }

    /// Most recently opened channel with this name
    pub fn channel(&self, name: &str) -> Option<MockChannel> {
        self.channels.lock().get(name).cloned()
    }
}

impl SshEngine for MockEngine {
    type Session = MockSession;

    fn new_session(&self, options: SessionOptions) -> Result<MockSession, SshError> {
        let script = self
            .hosts
            .get(&options.host)
            .cloned()
            .ok_or_else(|| SshError::TargetUnreachable(format!("unknown host {}", options.host)))?;
        Ok(MockSession {
            host: options.host,
            script,
            log: self.log.clone(),
            channels: self.channels.clone(),
            transport: None,
            last_error: None,
        })
    }
}

pub struct MockSession {
    host: String,
    script: HostScript,
    log: EventLog,
    channels: Arc<Mutex<HashMap<String, MockChannel>>>,
    transport: Option<BridgeSocket>,
    last_error: Option<String>,
}

impl MockSession {
    fn event(&self, what: &str) {
        self.log.push(format!("{}.{}", self.host, what));
    }

    fn open_channel(&self, name: &str) -> MockChannel {
        let channel = MockChannel::new(name, self.log.clone());
        self.channels.lock().insert(name.to_string(), channel.clone());
        channel
    }

    /// Client banner out through the bridge, server banner back in
    fn exchange_banners(&self, socket: &mut BridgeSocket) -> Result<(), SshError> {
        let forward = self
            .channels
            .lock()
            .get("forward")
            .cloned()
            .ok_or_else(|| SshError::Protocol("no forwarded channel".into()))?;

        socket.write_all(CLIENT_BANNER)?;
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut answered = false;
        let mut received = Vec::new();
        let mut buf = [0u8; 64];

        while received.as_slice() != SERVER_BANNER {
            if Instant::now() > deadline {
                return Err(SshError::Timeout("banner exchange".into()));
            }
            if !answered && forward.written().ends_with(CLIENT_BANNER) {
                forward.push_inbound(SERVER_BANNER);
                answered = true;
            }
            match socket.read(&mut buf) {
                Ok(0) => return Err(SshError::Protocol("bridge closed".into())),
                Ok(n) => received.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(1))
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

impl EngineSession for MockSession {
    type Channel = MockChannel;
    type Sftp = MemoryFs;

    fn connect(&mut self, transport: Transport) -> Result<(), SshError> {
        let transport = match transport {
            Transport::Tcp => {
                self.event("connect.tcp");
                None
            }
            Transport::Bridge(socket) => {
                self.event("connect.bridge");
                Some(socket)
            }
        };
        if self.script.unreachable {
            self.last_error = Some("connection refused".into());
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused).into());
        }
        if let Some(mut socket) = transport {
            if self.script.bridged_handshake {
                self.exchange_banners(&mut socket)?;
            }
            self.transport = Some(socket);
        }
        Ok(())
    }

    fn auth_publickey_auto(&mut self) -> Result<bool, SshError> {
        self.event("auth.publickey");
        Ok(self.script.accept_keys)
    }

    fn auth_password(&mut self, password: &str) -> Result<bool, SshError> {
        self.event("auth.password");
        Ok(self.script.password.as_deref() == Some(password))
    }

    fn open_forward(&mut self, _host: &str, _port: u16) -> Result<MockChannel, SshError> {
        self.event("forward");
        if self.script.refuse_forward {
            return Err(SshError::ChannelOpenFailed("administratively prohibited".into()));
        }
        Ok(self.open_channel("forward"))
    }

    fn open_shell(&mut self, _pty: PtyRequest<'_>) -> Result<MockChannel, SshError> {
        self.event("shell");
        if self.script.refuse_shell {
            return Err(SshError::ChannelOpenFailed("shell request denied".into()));
        }
        let mut channel = self.open_channel("shell");
        if self.script.shell_writes_need_pump {
            channel.write_gate = self.channels.lock().get("forward").cloned().map(Box::new);
        }
        Ok(channel)
    }

    fn open_sftp(&mut self) -> Result<MemoryFs, SshError> {
        self.event("sftp");
        self.script
            .fs
            .clone()
            .ok_or_else(|| SshError::ChannelOpenFailed("subsystem request failed".into()))
    }

    fn disconnect(&mut self) {
        self.event("disconnect");
        self.transport = None;
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }
}

#[derive(Debug, Clone)]
enum Node {
    /// Permission bits
    Dir(u32),
    File(Vec<u8>),
}

#[derive(Debug, Default)]
struct FsInner {
    nodes: BTreeMap<String, Node>,
    write_limit: Option<usize>,
}

/// SFTP double over an in-memory tree rooted at `/`, home `/home/alice`
#[derive(Debug, Clone)]
pub struct MemoryFs {
    inner: Arc<Mutex<FsInner>>,
}

pub const MEMORY_FS_HOME: &str = "/home/alice";
const MEMORY_FS_MTIME: u32 = 1_700_000_000;

impl Default for MemoryFs {
    fn default() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::Dir(0o755));
        nodes.insert("/home".to_string(), Node::Dir(0o755));
        nodes.insert(MEMORY_FS_HOME.to_string(), Node::Dir(0o755));
        Self {
            inner: Arc::new(Mutex::new(FsInner {
                nodes,
                write_limit: None,
            })),
        }
    }
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every file write accepts at most `limit` bytes
    pub fn short_writes(self, limit: usize) -> Self {
        self.inner.lock().write_limit = Some(limit);
        self
    }

    pub fn put_file(&self, path: &str, data: &[u8]) {
        self.inner
            .lock()
            .nodes
            .insert(resolve(path), Node::File(data.to_vec()));
    }

    pub fn put_dir(&self, path: &str) {
        self.inner.lock().nodes.insert(resolve(path), Node::Dir(0o755));
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        match self.inner.lock().nodes.get(&resolve(path)) {
            Some(Node::File(data)) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        self.inner.lock().nodes.contains_key(&resolve(path))
    }
}

fn resolve(path: &str) -> String {
    let joined = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{}/{}", MEMORY_FS_HOME, path)
    };
    let mut parts: Vec<&str> = Vec::new();
    for part in joined.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            p => parts.push(p),
        }
    }
    format!("/{}", parts.join("/"))
}

fn parent(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => path[..i].to_string(),
    }
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no such file: {}", path))
}

impl SftpBackend for MemoryFs {
    type File = MemoryFile;

    fn read_dir(&mut self, path: &str) -> io::Result<Vec<RemoteEntry>> {
        let dir = resolve(path);
        let inner = self.inner.lock();
        match inner.nodes.get(&dir) {
            Some(Node::Dir(_)) => {}
            Some(Node::File(_)) => {
                return Err(io::Error::new(io::ErrorKind::Other, "not a directory"))
            }
            None => return Err(not_found(&dir)),
        }
        Ok(inner
            .nodes
            .iter()
            .filter(|(p, _)| p.as_str() != "/" && parent(p) == dir)
            .map(|(p, node)| {
                let name = p.rsplit('/').next().unwrap_or_default().to_string();
                let (size, permissions) = match node {
                    Node::Dir(mode) => (4096, 0o040000 | mode),
                    Node::File(data) => (data.len() as u64, 0o100644),
                };
                RemoteEntry {
                    name,
                    attrs: RemoteAttrs {
                        size: Some(size),
                        mtime: Some(MEMORY_FS_MTIME),
                        permissions: Some(permissions),
                    },
                }
            })
            .collect())
    }

    fn open_read(&mut self, path: &str) -> io::Result<MemoryFile> {
        let path = resolve(path);
        match self.inner.lock().nodes.get(&path) {
            Some(Node::File(_)) => {}
            _ => return Err(not_found(&path)),
        }
        Ok(MemoryFile {
            fs: self.inner.clone(),
            path,
            pos: 0,
        })
    }

    fn create(&mut self, path: &str, _mode: u32) -> io::Result<MemoryFile> {
        let path = resolve(path);
        let mut inner = self.inner.lock();
        if !matches!(inner.nodes.get(&parent(&path)), Some(Node::Dir(_))) {
            return Err(not_found(&path));
        }
        inner.nodes.insert(path.clone(), Node::File(Vec::new()));
        Ok(MemoryFile {
            fs: self.inner.clone(),
            path,
            pos: 0,
        })
    }

    fn mkdir(&mut self, path: &str, mode: u32) -> io::Result<()> {
        let path = resolve(path);
        let mut inner = self.inner.lock();
        if inner.nodes.contains_key(&path) {
            return Err(io::ErrorKind::AlreadyExists.into());
        }
        if !matches!(inner.nodes.get(&parent(&path)), Some(Node::Dir(_))) {
            return Err(not_found(&path));
        }
        inner.nodes.insert(path, Node::Dir(mode));
        Ok(())
    }

    fn remove_file(&mut self, path: &str) -> io::Result<()> {
        let path = resolve(path);
        let mut inner = self.inner.lock();
        match inner.nodes.get(&path) {
            Some(Node::File(_)) => {
                inner.nodes.remove(&path);
                Ok(())
            }
            _ => Err(not_found(&path)),
        }
    }

    fn remove_dir(&mut self, path: &str) -> io::Result<()> {
        let path = resolve(path);
        let mut inner = self.inner.lock();
        if !matches!(inner.nodes.get(&path), Some(Node::Dir(_))) {
            return Err(not_found(&path));
        }
        if inner.nodes.keys().any(|p| p != "/" && parent(p) == path) {
            return Err(io::Error::new(io::ErrorKind::Other, "directory not empty"));
        }
        inner.nodes.remove(&path);
        Ok(())
    }

    fn canonicalize(&mut self, path: &str) -> io::Result<String> {
        let path = resolve(path);
        if self.inner.lock().nodes.contains_key(&path) {
            Ok(path)
        } else {
            Err(not_found(&path))
        }
    }
}

/// Open handle on a [`MemoryFs`] file
#[derive(Debug)]
pub struct MemoryFile {
    fs: Arc<Mutex<FsInner>>,
    path: String,
    pos: usize,
}

impl Read for MemoryFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let inner = self.fs.lock();
        let Some(Node::File(data)) = inner.nodes.get(&self.path) else {
            return Err(not_found(&self.path));
        };
        let rest = data.get(self.pos..).unwrap_or_default();
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        self.pos += n;
        Ok(n)
    }
}

impl Write for MemoryFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.fs.lock();
        let n = inner.write_limit.map_or(buf.len(), |l| l.min(buf.len()));
        let Some(Node::File(data)) = inner.nodes.get_mut(&self.path) else {
            return Err(not_found(&self.path));
        };
        data.extend_from_slice(&buf[..n]);
        self.pos += n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
