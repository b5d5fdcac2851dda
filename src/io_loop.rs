use mio::event::Event;
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Registry, Token, Waker};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use ofp_stream::OfpStream;
use ofp_switch::OfpSwitch;

/// Token reserved for the loop's internal waker.
pub const WAKE_TOKEN: Token = Token(0);

const EVENTS_CAPACITY: usize = 1024;

/// What a readiness event is about: the listening socket, or one switch
/// connection. Stored against the token at registration time and handed back
/// to the handler with every event.
#[derive(Clone)]
pub enum Channel {
    Listener,
    Switch(Arc<OfpSwitch>),
}

/// Callback invoked by an `IoLoop` for every ready channel.
pub trait SelectHandler: Send + Sync {
    fn handle_event(&self, event: &Event, channel: &Channel);
}

struct RegistrationDone {
    lock: Mutex<bool>,
    cvar: Condvar,
}

struct PendingRegistration {
    fd: RawFd,
    token: Token,
    interest: Interest,
    channel: Channel,
    done: Option<Arc<RegistrationDone>>,
}

/// A worker loop owning a non-blocking multiplexer over a subset of streams
/// plus, for the accept loop, the listening socket.
///
/// Each iteration clears per-tick stream state, arms write-interest for
/// streams with buffered output, polls up to the configured timeout,
/// dispatches ready channels to the handler and then applies registrations
/// queued by other threads. Blocking registrations are confirmed before the
/// loop re-enters the poll, so a caller holding the returned confirmation
/// knows the channel is installed.
pub struct IoLoop {
    id: usize,
    timeout: Option<Duration>,
    poll: Mutex<Poll>,
    registry: Registry,
    waker: Waker,
    stop: AtomicBool,
    next_token: AtomicUsize,
    streams: Mutex<Vec<Arc<OfpStream>>>,
    channels: Mutex<HashMap<Token, Channel>>,
    registration_queue: Mutex<VecDeque<PendingRegistration>>,
}

impl IoLoop {
    pub fn new(id: usize, timeout: Option<Duration>) -> io::Result<IoLoop> {
        let poll = Poll::new()?;
        let registry = poll.registry().try_clone()?;
        let waker = Waker::new(poll.registry(), WAKE_TOKEN)?;
        Ok(IoLoop {
            id,
            timeout,
            poll: Mutex::new(poll),
            registry,
            waker,
            stop: AtomicBool::new(false),
            next_token: AtomicUsize::new(1),
            streams: Mutex::new(Vec::new()),
            channels: Mutex::new(HashMap::new()),
            registration_queue: Mutex::new(VecDeque::new()),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Allocate a token for a channel that will be registered with this loop.
    pub fn alloc_token(&self) -> Token {
        Token(self.next_token.fetch_add(1, Ordering::Relaxed))
    }

    /// Queue a registration to be applied by the loop thread. Fire and
    /// forget: the channel becomes ready for events some iteration soon.
    pub fn register(&self, fd: RawFd, token: Token, interest: Interest, channel: Channel) {
        self.registration_queue
            .lock()
            .unwrap()
            .push_back(PendingRegistration {
                fd,
                token,
                interest,
                channel,
                done: None,
            });
        self.wakeup();
    }

    /// Queue a registration, wake the loop and wait until the channel is
    /// installed. Required when the caller must know events can be delivered
    /// before it proceeds, e.g. right after handing a new connection over.
    pub fn register_blocking(&self, fd: RawFd, token: Token, interest: Interest, channel: Channel) {
        let done = Arc::new(RegistrationDone {
            lock: Mutex::new(false),
            cvar: Condvar::new(),
        });
        self.registration_queue
            .lock()
            .unwrap()
            .push_back(PendingRegistration {
                fd,
                token,
                interest,
                channel,
                done: Some(done.clone()),
            });
        self.wakeup();

        let mut applied = done.lock.lock().unwrap();
        while !*applied {
            applied = done.cvar.wait(applied).unwrap();
        }
    }

    /// Main loop. Dispatches readiness events to `handler` until `shutdown`.
    pub fn do_loop(&self, handler: &dyn SelectHandler) -> io::Result<()> {
        let mut poll = self.poll.lock().unwrap();
        let mut events = Events::with_capacity(EVENTS_CAPACITY);
        self.process_registration_queue();

        while !self.stop.load(Ordering::Acquire) {
            let streams = self.streams.lock().unwrap().clone();
            for stream in &streams {
                stream.clear_wrote();
                if stream.needs_select() {
                    // Re-registering also re-delivers current readiness, so a
                    // socket that is already writable is picked up this tick.
                    if let Err(e) = self.reregister(
                        stream.raw_fd(),
                        stream.token(),
                        Interest::READABLE.add(Interest::WRITABLE),
                    ) {
                        debug!("Arming write interest failed on {}: {}", self, e);
                    }
                }
            }

            match poll.poll(&mut events, self.timeout) {
                Ok(()) => {}
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            for event in events.iter() {
                if event.token() == WAKE_TOKEN {
                    continue;
                }
                let channel = self.channels.lock().unwrap().get(&event.token()).cloned();
                match channel {
                    Some(ref channel) => handler.handle_event(event, channel),
                    // The channel was torn down while the event was in flight.
                    None => trace!("Event for stale token {:?} on {}", event.token(), self),
                }
            }

            self.process_registration_queue();
        }
        // Release any registrant that raced with shutdown.
        self.process_registration_queue();
        Ok(())
    }

    fn process_registration_queue(&self) {
        loop {
            let pending = self.registration_queue.lock().unwrap().pop_front();
            let PendingRegistration {
                fd,
                token,
                interest,
                channel,
                done,
            } = match pending {
                Some(p) => p,
                None => return,
            };

            match self.registry.register(&mut SourceFd(&fd), token, interest) {
                Ok(()) => {
                    self.channels.lock().unwrap().insert(token, channel);
                }
                Err(e) => error!("Failed to register channel on {}: {}", self, e),
            }

            if let Some(ref done) = done {
                let mut applied = done.lock.lock().unwrap();
                *applied = true;
                done.cvar.notify_all();
            }
        }
    }

    pub fn reregister(&self, fd: RawFd, token: Token, interest: Interest) -> io::Result<()> {
        self.registry
            .reregister(&mut SourceFd(&fd), token, interest)
    }

    pub fn deregister(&self, fd: RawFd) -> io::Result<()> {
        self.registry.deregister(&mut SourceFd(&fd))
    }

    pub fn channel(&self, token: Token) -> Option<Channel> {
        self.channels.lock().unwrap().get(&token).cloned()
    }

    pub fn remove_channel(&self, token: Token) {
        self.channels.lock().unwrap().remove(&token);
    }

    pub fn add_stream(&self, stream: Arc<OfpStream>) {
        self.streams.lock().unwrap().push(stream);
    }

    pub fn remove_stream(&self, stream: &Arc<OfpStream>) {
        self.streams
            .lock()
            .unwrap()
            .retain(|s| !Arc::ptr_eq(s, stream));
    }

    pub fn stream_count(&self) -> usize {
        self.streams.lock().unwrap().len()
    }

    /// Force a blocked poll to return immediately, e.g. after queueing a
    /// registration or requesting shutdown.
    pub fn wakeup(&self) {
        if let Err(e) = self.waker.wake() {
            warn!("Failed to wake {}: {}", self, e);
        }
    }

    /// Request loop exit; may return before the loop has fully stopped.
    /// Owned streams are not closed here, that is the controller's job.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::Release);
        self.wakeup();
    }
}

impl fmt::Display for IoLoop {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "IoLoop [id={} stream_count={}]", self.id, self.stream_count())
    }
}
