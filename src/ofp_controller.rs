use mio::event::Event;
use mio::net::TcpListener;
use mio::Interest;
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::os::unix::io::AsRawFd;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, RwLock, Weak};
use std::thread;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use io_loop::{Channel, IoLoop, SelectHandler};
use message::{ErrorMsg, FlowMod, Message, SwitchConfig, FULL_PACKET_MISS_LENGTH};
use ofp_header::Xid;
use ofp_message::MessageCodec;
use ofp_serialization::Codec0x01;
use ofp_stream::OfpStream;
use ofp_switch::OfpSwitch;
use ofp_utils::RepeatingTask;
use openflow::MsgCode;

const LIVENESS_POLL_INTERVAL: Duration = Duration::from_secs(1);
const LIVENESS_TIMEOUT: Duration = Duration::from_secs(5);
const SWITCH_REQUIREMENTS_INTERVAL: Duration = Duration::from_millis(500);
const SWITCH_REQUIREMENTS_TIMER_KEY: &str = "SW_REQ_TIMER";
const IO_LOOP_TIMEOUT: Duration = Duration::from_millis(500);

/// What a message listener tells the dispatcher to do next.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Continue,
    Stop,
}

/// Application handler for messages of a registered type. Invoked on the
/// reactor thread that read the message, in registration order (subject to
/// the callback-ordering constraint), so it must not block indefinitely.
pub trait MessageListener: Send + Sync {
    fn name(&self) -> &str;

    fn receive(&self, sw: &Arc<OfpSwitch>, xid: Xid, msg: &Message) -> Command;

    /// Optional capability: a listener that also filters by switch returns
    /// its filter here and is skipped for switches it has no interest in.
    fn switch_filter(&self) -> Option<&dyn SwitchFilter> {
        None
    }
}

/// The switch-filtering capability a `MessageListener` may additionally carry.
pub trait SwitchFilter: Send + Sync {
    fn is_interested(&self, sw: &Arc<OfpSwitch>) -> bool;
}

/// Handler for switch lifecycle events, notified from the single updates
/// thread in the global order the events occurred.
pub trait SwitchListener: Send + Sync {
    fn name(&self) -> &str;

    fn added_switch(&self, sw: &Arc<OfpSwitch>);

    fn removed_switch(&self, sw: &Arc<OfpSwitch>);
}

/// The registration surface the controller exposes to applications and to
/// reply futures. Removal is by listener identity.
pub trait OfpProvider: Send + Sync {
    fn add_message_listener(&self, typ: MsgCode, listener: Arc<dyn MessageListener>);

    fn remove_message_listener(&self, typ: MsgCode, listener: &dyn MessageListener);

    fn add_switch_listener(&self, listener: Arc<dyn SwitchListener>);

    fn remove_switch_listener(&self, listener: &dyn SwitchListener);
}

#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Bind address; `None` listens on all interfaces.
    pub listen_address: Option<IpAddr>,
    pub listen_port: u16,
    /// Number of switch worker loops.
    pub threads: usize,
    pub no_delay: bool,
    /// Flush on every write instead of batching per reactor tick.
    pub immediate: bool,
    /// Keep re-asserting the handshake requirements until confirmed.
    pub switch_requirements_timer: bool,
}

impl Default for ControllerConfig {
    fn default() -> ControllerConfig {
        ControllerConfig {
            listen_address: None,
            listen_port: 6633,
            threads: 1,
            no_delay: true,
            immediate: false,
            switch_requirements_timer: true,
        }
    }
}

enum Update {
    Added(Arc<OfpSwitch>),
    Removed(Arc<OfpSwitch>),
    Shutdown,
}

/// The controller: accepts switch connections, drives the handshake state
/// machine, owns the listener registries and the switch table, dispatches
/// inbound messages and probes liveness.
pub struct OfpController {
    config: ControllerConfig,
    codec: Arc<dyn MessageCodec>,
    self_ref: Mutex<Weak<OfpController>>,
    message_listeners: RwLock<HashMap<MsgCode, Arc<Vec<Arc<dyn MessageListener>>>>>,
    switch_listeners: RwLock<Arc<Vec<Arc<dyn SwitchListener>>>>,
    callback_ordering: Mutex<HashMap<String, String>>,
    switches: Mutex<HashMap<u64, Arc<OfpSwitch>>>,
    switch_io_loops: Mutex<Vec<Arc<IoLoop>>>,
    listener_io_loop: Mutex<Option<Arc<IoLoop>>>,
    listen_sock: Mutex<Option<TcpListener>>,
    local_addr: Mutex<Option<SocketAddr>>,
    shutting_down: AtomicBool,
    shutdown_signal: (Mutex<bool>, Condvar),
    updates_tx: Mutex<Sender<Update>>,
    updates_rx: Mutex<Option<Receiver<Update>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl OfpController {
    pub fn new(config: ControllerConfig) -> Arc<OfpController> {
        let (tx, rx) = mpsc::channel();
        let controller = Arc::new(OfpController {
            config,
            codec: Arc::new(Codec0x01),
            self_ref: Mutex::new(Weak::new()),
            message_listeners: RwLock::new(HashMap::new()),
            switch_listeners: RwLock::new(Arc::new(Vec::new())),
            callback_ordering: Mutex::new(HashMap::new()),
            switches: Mutex::new(HashMap::new()),
            switch_io_loops: Mutex::new(Vec::new()),
            listener_io_loop: Mutex::new(None),
            listen_sock: Mutex::new(None),
            local_addr: Mutex::new(None),
            shutting_down: AtomicBool::new(false),
            shutdown_signal: (Mutex::new(false), Condvar::new()),
            updates_tx: Mutex::new(tx),
            updates_rx: Mutex::new(Some(rx)),
            threads: Mutex::new(Vec::new()),
        });
        *controller.self_ref.lock().unwrap() = Arc::downgrade(&controller);
        controller
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Ordering constraints, message-type name to a comma-separated ordered
    /// list of listener names. Consulted only at registration time.
    pub fn set_callback_ordering(&self, ordering: HashMap<String, String>) {
        *self.callback_ordering.lock().unwrap() = ordering;
    }

    /// The owning `Arc` of this controller; always set by `new`.
    fn me(&self) -> Arc<OfpController> {
        self.self_ref
            .lock()
            .unwrap()
            .upgrade()
            .expect("controller self reference not initialized")
    }

    /// Launch the switch worker loops, the updates thread and the liveness
    /// timer. Call once before `start_listener`.
    pub fn start_up(&self) -> io::Result<()> {
        let thread_count = if self.config.threads == 0 {
            1
        } else {
            self.config.threads
        };

        for i in 0..thread_count {
            let io_loop = Arc::new(IoLoop::new(i, Some(IO_LOOP_TIMEOUT))?);
            self.switch_io_loops.lock().unwrap().push(io_loop.clone());
            let controller = self.me();
            let handle = thread::Builder::new()
                .name(format!("io-loop-{}", i))
                .spawn(move || {
                    info!("Started worker thread for {}", io_loop);
                    if let Err(e) = io_loop.do_loop(&*controller) {
                        error!("Exception during worker loop, terminating thread: {}", e);
                    }
                })?;
            self.threads.lock().unwrap().push(handle);
        }

        if let Some(updates) = self.updates_rx.lock().unwrap().take() {
            let controller = self.me();
            let handle = thread::Builder::new()
                .name("controller-updates".to_string())
                .spawn(move || controller.run_updates(updates))?;
            self.threads.lock().unwrap().push(handle);
        }

        let controller = self.me();
        let handle = thread::Builder::new()
            .name("liveness-timer".to_string())
            .spawn(move || controller.run_liveness())?;
        self.threads.lock().unwrap().push(handle);

        info!("Controller core started");
        Ok(())
    }

    /// Bind the listening socket and launch the accept loop. Idempotent.
    pub fn start_listener(&self) -> io::Result<()> {
        if self.listen_sock.lock().unwrap().is_some() {
            return Ok(());
        }

        let ip = self
            .config
            .listen_address
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let listener = TcpListener::bind(SocketAddr::new(ip, self.config.listen_port))?;
        *self.local_addr.lock().unwrap() = listener.local_addr().ok();

        let io_loop = Arc::new(IoLoop::new(self.config.threads, None)?);
        let token = io_loop.alloc_token();
        let fd = listener.as_raw_fd();
        *self.listen_sock.lock().unwrap() = Some(listener);
        io_loop.register(fd, token, Interest::READABLE, Channel::Listener);
        *self.listener_io_loop.lock().unwrap() = Some(io_loop.clone());

        let controller = self.me();
        let handle = thread::Builder::new()
            .name("accept-loop".to_string())
            .spawn(move || {
                if let Err(e) = io_loop.do_loop(&*controller) {
                    error!("Exception during accept loop, terminating thread: {}", e);
                }
            })?;
        self.threads.lock().unwrap().push(handle);

        info!(
            "Controller listening on {}:{}",
            self.config
                .listen_address
                .map(|a| a.to_string())
                .unwrap_or_else(|| "*".to_string()),
            self.config.listen_port
        );
        Ok(())
    }

    /// Stop accepting new switches. Idempotent; existing connections stay up.
    pub fn stop_listener(&self) {
        let listener = self.listen_sock.lock().unwrap().take();
        if listener.is_none() {
            return;
        }
        if let Some(ref io_loop) = *self.listener_io_loop.lock().unwrap() {
            io_loop.shutdown();
        }
    }

    /// Full shutdown: stop the listener, disconnect every switch, stop the
    /// worker loops and join all controller threads.
    pub fn shut_down(&self) {
        self.shutting_down.store(true, Ordering::Release);
        {
            let (ref lock, ref cvar) = self.shutdown_signal;
            *lock.lock().unwrap() = true;
            cvar.notify_all();
        }

        self.stop_listener();

        let switches: Vec<Arc<OfpSwitch>> =
            self.switches.lock().unwrap().values().cloned().collect();
        for sw in switches {
            self.disconnect_switch(&sw);
        }

        for io_loop in self.switch_io_loops.lock().unwrap().iter() {
            io_loop.shutdown();
        }

        let _ = self.updates_tx.lock().unwrap().send(Update::Shutdown);

        let handles: Vec<JoinHandle<()>> = self.threads.lock().unwrap().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
        info!("Controller core shutdown");
    }

    /// Address of the bound listening socket, once `start_listener` ran.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap()
    }

    /// Snapshot of all live (handshake-complete) switches by datapath id.
    pub fn switches(&self) -> HashMap<u64, Arc<OfpSwitch>> {
        self.switches.lock().unwrap().clone()
    }

    /// Read-only snapshot of the message listener registry.
    pub fn listeners(&self) -> HashMap<MsgCode, Vec<Arc<dyn MessageListener>>> {
        self.message_listeners
            .read()
            .unwrap()
            .iter()
            .map(|(typ, list)| (*typ, (**list).clone()))
            .collect()
    }

    pub fn message_listener_count(&self, typ: MsgCode) -> usize {
        self.message_listeners
            .read()
            .unwrap()
            .get(&typ)
            .map(|l| l.len())
            .unwrap_or(0)
    }

    pub fn switch_listener_count(&self) -> usize {
        self.switch_listeners.read().unwrap().len()
    }

    fn run_updates(&self, updates: Receiver<Update>) {
        loop {
            match updates.recv() {
                Ok(Update::Added(sw)) => self.notify_switch_listeners(&sw, true),
                Ok(Update::Removed(sw)) => self.notify_switch_listeners(&sw, false),
                Ok(Update::Shutdown) | Err(_) => return,
            }
        }
    }

    fn notify_switch_listeners(&self, sw: &Arc<OfpSwitch>, added: bool) {
        let listeners = self.switch_listeners.read().unwrap().clone();
        for listener in listeners.iter() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                if added {
                    listener.added_switch(sw);
                } else {
                    listener.removed_switch(sw);
                }
            }));
            if outcome.is_err() {
                error!("Error calling switch listener [{}]", listener.name());
            }
        }
    }

    fn run_liveness(&self) {
        let (ref lock, ref cvar) = self.shutdown_signal;
        loop {
            {
                let stop = lock.lock().unwrap();
                let (stop, _) = cvar
                    .wait_timeout_while(stop, LIVENESS_POLL_INTERVAL, |s| !*s)
                    .unwrap();
                if *stop {
                    return;
                }
            }
            self.check_switch_liveness();
        }
    }

    /// Probe every live switch: idle past one timeout gets an echo, idle
    /// past two timeouts (echo included) gets disconnected.
    fn check_switch_liveness(&self) {
        trace!("Liveness timer running");
        let now = Instant::now();
        let switches: Vec<Arc<OfpSwitch>> =
            self.switches.lock().unwrap().values().cloned().collect();

        for sw in switches {
            let idle = now.saturating_duration_since(sw.last_received_message_time());
            if idle >= LIVENESS_TIMEOUT * 2 {
                info!(
                    "Switch liveness timeout detected {:?}, disconnecting {}",
                    idle, sw
                );
                self.disconnect_switch(&sw);
            } else if idle >= LIVENESS_TIMEOUT {
                let probe =
                    sw.send_message(sw.next_transaction_id(), &Message::EchoRequest(Vec::new()));
                if probe.is_err() || sw.stream().write_failure() {
                    error!("Failure sending liveness probe, disconnecting switch {}", sw);
                    self.disconnect_switch(&sw);
                }
            }
        }
    }

    fn pick_io_loop(&self) -> Option<Arc<IoLoop>> {
        // Try to even the number of switches per worker loop.
        let loops = self.switch_io_loops.lock().unwrap();
        loops.iter().min_by_key(|l| l.stream_count()).cloned()
    }

    fn handle_listen_event(&self) {
        loop {
            let accepted = {
                let guard = self.listen_sock.lock().unwrap();
                match *guard {
                    Some(ref listener) => listener.accept(),
                    None => return,
                }
            };
            let (sock, addr) = match accepted {
                Ok(pair) => pair,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("Accept failure: {}", e);
                    return;
                }
            };

            info!("Switch connected from {}", addr);
            if let Err(e) = sock.set_nodelay(self.config.no_delay) {
                debug!("Failed setting TCP_NODELAY for {}: {}", addr, e);
            }

            let io_loop = match self.pick_io_loop() {
                Some(io_loop) => io_loop,
                None => {
                    warn!("No worker loops running, dropping connection from {}", addr);
                    continue;
                }
            };

            let token = io_loop.alloc_token();
            let stream = Arc::new(OfpStream::new(
                sock,
                token,
                io_loop.clone(),
                self.codec.clone(),
                self.config.immediate,
            ));
            let sw = Arc::new(OfpSwitch::new(stream.clone()));
            if let Some(me) = self.self_ref.lock().unwrap().upgrade() {
                let provider: Arc<dyn OfpProvider> = me;
                sw.set_provider(Arc::downgrade(&provider));
            }

            if let Err(e) = stream.write(0, &Message::Hello) {
                error!("Failed to send hello to {}: {}", addr, e);
            }

            io_loop.add_stream(stream.clone());
            // Blocking so readiness cannot fire before the switch is known.
            io_loop.register_blocking(
                stream.raw_fd(),
                token,
                Interest::READABLE,
                Channel::Switch(sw.clone()),
            );
            info!("Added switch {} to {}", sw, io_loop);
        }
    }

    fn handle_switch_event(&self, sw: &Arc<OfpSwitch>, event: &Event) {
        let stream = sw.stream().clone();

        if event.is_readable() || event.is_read_closed() {
            match stream.read() {
                Ok(Some(messages)) => {
                    sw.set_last_received_message_time(Instant::now());
                    self.handle_messages(sw, messages);
                    if stream.reached_eof() {
                        self.disconnect_switch(sw);
                        return;
                    }
                }
                Ok(None) => {
                    // graceful disconnect
                    self.disconnect_switch(sw);
                    return;
                }
                Err(e) => {
                    info!("Read failure from {}: {}", sw, e);
                    self.disconnect_switch(sw);
                    return;
                }
            }
        }

        if event.is_writable() {
            stream.clear_select();
            if let Err(e) =
                stream
                    .io_loop()
                    .reregister(stream.raw_fd(), stream.token(), Interest::READABLE)
            {
                debug!("Failed resetting interest for {}: {}", sw, e);
            }
        }

        if stream.write_failure() {
            self.disconnect_switch(sw);
        }
    }

    /// Handle replies to protocol-housekeeping messages and pass the rest to
    /// the listener registry.
    fn handle_messages(&self, sw: &Arc<OfpSwitch>, messages: Vec<(Xid, Message)>) {
        for (xid, message) in messages {
            // A detected write failure means the switch is about to be torn
            // down; abandon the rest of the batch.
            if sw.stream().write_failure() {
                break;
            }
            match message {
                Message::Hello => {
                    debug!("HELLO from {}", sw);
                    if let Err(e) = sw.send_message(0, &Message::FeaturesReq) {
                        error!("Failed to send features request to {}: {}", sw, e);
                    }
                    // Delete all pre-existing flows
                    if let Err(e) = sw.send_message(0, &Message::FlowMod(FlowMod::delete_all())) {
                        error!("Failed to send flow table clear to {}: {}", sw, e);
                    }
                    if self.config.switch_requirements_timer {
                        self.start_switch_requirements_timer(sw);
                    }
                }
                Message::EchoRequest(data) => {
                    if let Err(e) = sw.send_message(xid, &Message::EchoReply(data)) {
                        error!("Failed to send echo reply to {}: {}", sw, e);
                    }
                }
                Message::EchoReply(_) => {
                    // Already handled by the last-received timestamp
                }
                Message::FeaturesReply(features) => {
                    debug!("Features reply from {}", sw);
                    sw.set_features(features);
                    self.add_switch(sw);
                }
                Message::ConfigReply(config) => {
                    if config.miss_send_len == FULL_PACKET_MISS_LENGTH {
                        debug!(
                            "Config reply from {} confirms miss length set to 0xffff",
                            sw
                        );
                        self.stop_switch_requirements_timer(sw);
                    }
                }
                Message::Error(ref error) => self.log_error(sw, error),
                other => {
                    // Don't pass along messages until we have the features reply
                    if !sw.has_features() {
                        warn!(
                            "Message type {} received from switch {} before receiving a features reply",
                            other.msg_code(),
                            sw
                        );
                        continue;
                    }
                    self.dispatch_message(sw, xid, &other);
                }
            }
        }
    }

    fn dispatch_message(&self, sw: &Arc<OfpSwitch>, xid: Xid, msg: &Message) {
        let code = msg.msg_code();
        let listeners = self.message_listeners.read().unwrap().get(&code).cloned();
        let listeners = match listeners {
            Some(listeners) => listeners,
            None => {
                error!("Unhandled OF message: {} from {}", code, sw);
                return;
            }
        };

        for listener in listeners.iter() {
            if let Some(filter) = listener.switch_filter() {
                if !filter.is_interested(sw) {
                    continue;
                }
            }
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener.receive(sw, xid, msg)));
            match outcome {
                Ok(Command::Continue) => {}
                Ok(Command::Stop) => break,
                Err(_) => {
                    error!(
                        "Failure calling listener [{}] with message [{}] from [{}]",
                        listener.name(),
                        code,
                        sw
                    );
                }
            }
        }
    }

    fn log_error(&self, sw: &Arc<OfpSwitch>, error: &ErrorMsg) {
        let err_type = match error.err_type {
            0 => "HelloFailed",
            1 => "BadRequest",
            2 => "BadAction",
            3 => "FlowModFailed",
            4 => "PortModFailed",
            5 => "QueueOpFailed",
            _ => "Unknown",
        };
        error!("Error {} code {} from {}", err_type, error.code, sw);
    }

    /// Creates a timer that keeps requesting a switch's features reply until
    /// it is received, then keeps asserting the configuration until a config
    /// reply confirms it. Self-cancels when the transport dies.
    fn start_switch_requirements_timer(&self, sw: &Arc<OfpSwitch>) {
        let controller = self.self_ref.lock().unwrap().clone();
        let sw_task = sw.clone();
        let task = RepeatingTask::spawn(
            "switch-requirements",
            SWITCH_REQUIREMENTS_INTERVAL,
            move || {
                let controller = match controller.upgrade() {
                    Some(controller) => controller,
                    None => return false,
                };
                if sw_task.is_disconnected() || sw_task.stream().write_failure() {
                    return false;
                }
                let sent = if !sw_task.has_features() {
                    // send another features request
                    sw_task.send_message(0, &Message::FeaturesReq)
                } else {
                    // Ensure we receive the full packet via PacketIn
                    sw_task.send_messages(&[
                        (
                            0,
                            Message::SetConfig(SwitchConfig {
                                flags: 0,
                                miss_send_len: FULL_PACKET_MISS_LENGTH,
                            }),
                        ),
                        (0, Message::GetConfigReq),
                    ])
                };
                if let Err(e) = sent {
                    error!("Exception in switch requirements timer for {}: {}", sw_task, e);
                    controller.stop_switch_requirements_timer(&sw_task);
                    return false;
                }
                true
            },
        );
        sw.set_attribute(SWITCH_REQUIREMENTS_TIMER_KEY, Box::new(task));
    }

    fn stop_switch_requirements_timer(&self, sw: &Arc<OfpSwitch>) {
        if let Some(value) = sw.remove_attribute(SWITCH_REQUIREMENTS_TIMER_KEY) {
            if let Ok(task) = value.downcast::<RepeatingTask>() {
                task.cancel();
            }
        }
    }

    /// Adds a switch that has completed its handshake and notifies listeners.
    fn add_switch(&self, sw: &Arc<OfpSwitch>) {
        let previous = self.switches.lock().unwrap().insert(sw.id(), sw.clone());
        if let Some(previous) = previous {
            warn!("New switch {} replaces an existing entry {}", sw, previous);
        }
        self.enqueue_update(Update::Added(sw.clone()));
    }

    /// Removes a disconnected switch and notifies listeners.
    fn remove_switch(&self, sw: &Arc<OfpSwitch>) {
        let removed = {
            let mut switches = self.switches.lock().unwrap();
            let is_current = match switches.get(&sw.id()) {
                Some(current) => Arc::ptr_eq(current, sw),
                None => false,
            };
            if is_current {
                switches.remove(&sw.id());
            }
            is_current
        };
        if removed {
            self.enqueue_update(Update::Removed(sw.clone()));
        } else {
            warn!("Removing switch {} that has already been replaced", sw);
        }
    }

    fn enqueue_update(&self, update: Update) {
        if self.updates_tx.lock().unwrap().send(update).is_err() {
            error!("Failure adding update to queue");
        }
    }

    /// Disconnect the switch from the controller. Safe to call from any
    /// thread and any number of times; teardown runs exactly once.
    pub fn disconnect_switch(&self, sw: &Arc<OfpSwitch>) {
        if !sw.mark_disconnected() {
            return;
        }
        let stream = sw.stream().clone();
        let io_loop = stream.io_loop().clone();
        io_loop.remove_stream(&stream);
        io_loop.remove_channel(stream.token());
        if let Err(e) = io_loop.deregister(stream.raw_fd()) {
            trace!("Deregistering {} failed: {}", sw, e);
        }
        self.stop_switch_requirements_timer(sw);
        // only remove if we have a features reply (DPID)
        if sw.has_features() {
            self.remove_switch(sw);
        }
        stream.close();
        info!("Switch disconnected {}", sw);
    }
}

impl OfpProvider for OfpController {
    fn add_message_listener(&self, typ: MsgCode, listener: Arc<dyn MessageListener>) {
        let mut registry = self.message_listeners.write().unwrap();
        let list = registry.entry(typ).or_insert_with(|| Arc::new(Vec::new()));
        let mut updated: Vec<Arc<dyn MessageListener>> = (**list).clone();

        let constrained: Vec<String> = match self.callback_ordering.lock().unwrap().get(&typ.to_string()) {
            Some(order) => order.split(',').map(|n| n.trim().to_string()).collect(),
            None => Vec::new(),
        };

        match constrained.iter().position(|n| n == listener.name()) {
            Some(position) => {
                // Insert before the first listener not constrained to
                // precede this one.
                let before = &constrained[..position];
                let mut added = false;
                for i in 0..updated.len() {
                    if before.iter().any(|n| n == updated[i].name()) {
                        continue;
                    }
                    updated.insert(i, listener.clone());
                    added = true;
                    break;
                }
                if !added {
                    updated.push(listener);
                }
            }
            None => updated.push(listener),
        }

        *list = Arc::new(updated);
    }

    fn remove_message_listener(&self, typ: MsgCode, listener: &dyn MessageListener) {
        let target = listener as *const dyn MessageListener as *const ();
        let mut registry = self.message_listeners.write().unwrap();
        if let Some(list) = registry.get_mut(&typ) {
            let updated: Vec<Arc<dyn MessageListener>> = list
                .iter()
                .filter(|l| Arc::as_ptr(*l) as *const () != target)
                .cloned()
                .collect();
            *list = Arc::new(updated);
        }
    }

    fn add_switch_listener(&self, listener: Arc<dyn SwitchListener>) {
        let mut listeners = self.switch_listeners.write().unwrap();
        let target = Arc::as_ptr(&listener) as *const ();
        if listeners.iter().any(|l| Arc::as_ptr(l) as *const () == target) {
            return;
        }
        let mut updated = (**listeners).clone();
        updated.push(listener);
        *listeners = Arc::new(updated);
    }

    fn remove_switch_listener(&self, listener: &dyn SwitchListener) {
        let target = listener as *const dyn SwitchListener as *const ();
        let mut listeners = self.switch_listeners.write().unwrap();
        let updated: Vec<Arc<dyn SwitchListener>> = listeners
            .iter()
            .filter(|l| Arc::as_ptr(*l) as *const () != target)
            .cloned()
            .collect();
        *listeners = Arc::new(updated);
    }
}

impl SelectHandler for OfpController {
    fn handle_event(&self, event: &Event, channel: &Channel) {
        match *channel {
            Channel::Listener => self.handle_listen_event(),
            Channel::Switch(ref sw) => self.handle_switch_event(sw, event),
        }
    }
}
