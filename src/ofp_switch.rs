use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use message::{Message, StatsReq};
use message::SwitchFeatures;
use ofp_controller::OfpProvider;
use ofp_future::StatisticsFuture;
use ofp_header::Xid;
use ofp_message::OfpSerializationError;
use ofp_stream::OfpStream;
use openflow::MsgCode;

#[derive(Debug, Fail)]
pub enum SwitchSendError {
    #[fail(display = "controller is no longer available")]
    ControllerGone,
    #[fail(display = "serialization error: {}", error)]
    Serialization { error: OfpSerializationError },
}

/// One connected remote switch.
///
/// Created on accept with no identity; the datapath id becomes available
/// once the features reply arrives and the controller promotes the switch
/// into its table. Never reused after disconnect.
pub struct OfpSwitch {
    stream: Arc<OfpStream>,
    description: String,
    provider: Mutex<Option<Weak<dyn OfpProvider>>>,
    attributes: Mutex<HashMap<String, Box<dyn Any + Send>>>,
    connected_since: Instant,
    last_received_message_time: Mutex<Instant>,
    features: Mutex<Option<SwitchFeatures>>,
    transaction_id_source: AtomicU32,
    disconnected: AtomicBool,
}

impl OfpSwitch {
    pub fn new(stream: Arc<OfpStream>) -> OfpSwitch {
        let description = match stream.peer_addr() {
            Some(addr) => addr.to_string(),
            None => "unconnected".to_string(),
        };
        let now = Instant::now();
        OfpSwitch {
            stream,
            description,
            provider: Mutex::new(None),
            attributes: Mutex::new(HashMap::new()),
            connected_since: now,
            last_received_message_time: Mutex::new(now),
            features: Mutex::new(None),
            transaction_id_source: AtomicU32::new(0),
            disconnected: AtomicBool::new(false),
        }
    }

    pub fn stream(&self) -> &Arc<OfpStream> {
        &self.stream
    }

    pub fn set_provider(&self, provider: Weak<dyn OfpProvider>) {
        *self.provider.lock().unwrap() = Some(provider);
    }

    pub fn provider(&self) -> Option<Arc<dyn OfpProvider>> {
        match *self.provider.lock().unwrap() {
            Some(ref weak) => weak.upgrade(),
            None => None,
        }
    }

    /// The datapath id of this switch.
    ///
    /// Only available once the handshake has completed; asking earlier is a
    /// caller bug.
    pub fn id(&self) -> u64 {
        self.features
            .lock()
            .unwrap()
            .as_ref()
            .expect("features reply has not yet been received")
            .datapath_id
    }

    pub fn has_features(&self) -> bool {
        self.features.lock().unwrap().is_some()
    }

    pub fn features(&self) -> Option<SwitchFeatures> {
        self.features.lock().unwrap().clone()
    }

    pub fn set_features(&self, features: SwitchFeatures) {
        *self.features.lock().unwrap() = Some(features);
    }

    pub fn connected_since(&self) -> Instant {
        self.connected_since
    }

    pub fn last_received_message_time(&self) -> Instant {
        *self.last_received_message_time.lock().unwrap()
    }

    pub fn set_last_received_message_time(&self, when: Instant) {
        *self.last_received_message_time.lock().unwrap() = when;
    }

    /// Next transaction id for requests sent to this switch. Monotonically
    /// increasing, starting at 1.
    pub fn next_transaction_id(&self) -> Xid {
        self.transaction_id_source.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn set_attribute(&self, key: &str, value: Box<dyn Any + Send>) {
        self.attributes.lock().unwrap().insert(key.to_string(), value);
    }

    pub fn remove_attribute(&self, key: &str) -> Option<Box<dyn Any + Send>> {
        self.attributes.lock().unwrap().remove(key)
    }

    pub fn has_attribute(&self, key: &str) -> bool {
        self.attributes.lock().unwrap().contains_key(key)
    }

    /// Latch this switch as disconnected. Returns true for exactly one
    /// caller, which then owns the teardown side effects.
    pub fn mark_disconnected(&self) -> bool {
        !self.disconnected.swap(true, Ordering::AcqRel)
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }

    /// Send a message to the switch.
    pub fn send_message(&self, xid: Xid, message: &Message) -> Result<(), OfpSerializationError> {
        self.stream.write(xid, message)
    }

    /// Send a batch of messages to the switch.
    pub fn send_messages(&self, messages: &[(Xid, Message)]) -> Result<(), OfpSerializationError> {
        self.stream.write_all(messages)
    }

    /// Issue a statistics request on `sw` and return a future that resolves
    /// to the aggregated reply fragments.
    pub fn get_statistics(
        sw: &Arc<OfpSwitch>,
        request: StatsReq,
    ) -> Result<StatisticsFuture, SwitchSendError> {
        let provider = sw.provider().ok_or(SwitchSendError::ControllerGone)?;
        let xid = sw.next_transaction_id();
        let future = StatisticsFuture::new(Arc::downgrade(&provider), sw.clone(), xid);
        provider.add_message_listener(MsgCode::StatsResp, future.message_listener());
        provider.add_switch_listener(future.switch_listener());

        if let Err(error) = sw.stream.write(xid, &Message::StatsRequest(request)) {
            future.cancel();
            return Err(SwitchSendError::Serialization { error });
        }
        Ok(future)
    }
}

impl fmt::Display for OfpSwitch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self.features.lock().unwrap() {
            Some(ref feats) => write!(
                f,
                "OfpSwitch [{} DPID[{:016x}]]",
                self.description, feats.datapath_id
            ),
            None => write!(f, "OfpSwitch [{} DPID[?]]", self.description),
        }
    }
}
