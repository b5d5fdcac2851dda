use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread;
use std::time::Duration;

use message::{Message, Statistic};
use ofp_controller::{Command, MessageListener, OfpProvider, SwitchFilter, SwitchListener};
use ofp_header::Xid;
use ofp_switch::OfpSwitch;
use openflow::MsgCode;

pub const DEFAULT_FUTURE_TIMEOUT: Duration = Duration::from_secs(60);

/// Accumulation step of a reply future.
///
/// `collect` folds one reply with the matching transaction id into the
/// running result and reports whether the reply is now complete. It only
/// ever runs under the future's state lock, so the accumulated result is
/// fully visible to whoever observes completion.
pub trait ReplyCollector: Send + Sync + 'static {
    type Output: Clone + Default + Send + 'static;

    fn name(&self) -> &'static str;
    fn collect(&self, acc: &mut Self::Output, msg: &Message) -> bool;
}

struct FutureState<V> {
    result: V,
    done: bool,
    cancelled: bool,
}

struct FutureCore<C: ReplyCollector> {
    provider: Weak<dyn OfpProvider>,
    sw: Arc<OfpSwitch>,
    response_type: MsgCode,
    transaction_id: Xid,
    collector: C,
    state: Mutex<FutureState<C::Output>>,
    done_cvar: Condvar,
}

impl<C: ReplyCollector> FutureCore<C> {
    /// Remove this future from both registries. Runs at most once because
    /// every caller flips `done` under the state lock first.
    fn unregister(&self) {
        if let Some(provider) = self.provider.upgrade() {
            provider.remove_message_listener(self.response_type, self);
            provider.remove_switch_listener(self);
        }
    }

    fn cancel(&self) -> bool {
        {
            let mut state = self.state.lock().unwrap();
            if state.done {
                return false;
            }
            state.cancelled = true;
            state.done = true;
        }
        self.unregister();
        self.done_cvar.notify_all();
        true
    }

    fn release(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if state.done {
                return;
            }
            state.done = true;
        }
        self.unregister();
        self.done_cvar.notify_all();
    }
}

impl<C: ReplyCollector> MessageListener for FutureCore<C> {
    fn name(&self) -> &str {
        self.collector.name()
    }

    fn receive(&self, _sw: &Arc<OfpSwitch>, xid: Xid, msg: &Message) -> Command {
        if xid != self.transaction_id {
            // Another correlator's reply; let it through.
            return Command::Continue;
        }
        let finished = {
            let mut state = self.state.lock().unwrap();
            if state.done {
                false
            } else {
                let finished = self.collector.collect(&mut state.result, msg);
                if finished {
                    state.done = true;
                }
                finished
            }
        };
        if finished {
            self.unregister();
            self.done_cvar.notify_all();
        }
        // A reply addressed to this requester is never anyone else's.
        Command::Stop
    }

    fn switch_filter(&self) -> Option<&dyn SwitchFilter> {
        Some(self)
    }
}

impl<C: ReplyCollector> SwitchFilter for FutureCore<C> {
    fn is_interested(&self, sw: &Arc<OfpSwitch>) -> bool {
        Arc::ptr_eq(&self.sw, sw)
    }
}

impl<C: ReplyCollector> SwitchListener for FutureCore<C> {
    fn name(&self) -> &str {
        self.collector.name()
    }

    fn added_switch(&self, _sw: &Arc<OfpSwitch>) {}

    fn removed_switch(&self, sw: &Arc<OfpSwitch>) {
        if Arc::ptr_eq(&self.sw, sw) {
            // Whatever has accumulated is all there will ever be.
            self.release();
        }
    }
}

/// A blocking future resolving an asynchronous reply exchange.
///
/// Registered transiently as a message listener and a switch listener for
/// one (switch, reply type, transaction id) binding; deregisters itself
/// exactly once on completion, cancellation, timeout or removal of its
/// switch, whichever happens first.
pub struct MessageFuture<C: ReplyCollector> {
    core: Arc<FutureCore<C>>,
}

impl<C: ReplyCollector> MessageFuture<C> {
    pub fn with_timeout(
        provider: Weak<dyn OfpProvider>,
        sw: Arc<OfpSwitch>,
        response_type: MsgCode,
        transaction_id: Xid,
        collector: C,
        timeout: Duration,
    ) -> MessageFuture<C> {
        let core = Arc::new(FutureCore {
            provider,
            sw,
            response_type,
            transaction_id,
            collector,
            state: Mutex::new(FutureState {
                result: Default::default(),
                done: false,
                cancelled: false,
            }),
            done_cvar: Condvar::new(),
        });

        let timer_core = core.clone();
        let spawned = thread::Builder::new()
            .name("future-timeout".to_string())
            .spawn(move || {
                let timed_out = {
                    let state = timer_core.state.lock().unwrap();
                    let (state, _) = timer_core
                        .done_cvar
                        .wait_timeout_while(state, timeout, |s| !s.done)
                        .unwrap();
                    !state.done
                };
                if timed_out {
                    timer_core.cancel();
                }
            });
        if let Err(e) = spawned {
            error!("Failed to spawn future timeout thread: {}", e);
        }

        MessageFuture { core }
    }

    /// The listener registration handle for this future.
    pub fn message_listener(&self) -> Arc<dyn MessageListener> {
        self.core.clone()
    }

    /// The switch-listener registration handle for this future.
    pub fn switch_listener(&self) -> Arc<dyn SwitchListener> {
        self.core.clone()
    }

    /// Block until completion, cancellation or timeout, then return the
    /// accumulated result.
    pub fn get(&self) -> C::Output {
        let state = self.core.state.lock().unwrap();
        let state = self
            .core
            .done_cvar
            .wait_while(state, |s| !s.done)
            .unwrap();
        state.result.clone()
    }

    /// Block up to `timeout` and return whatever has accumulated by then,
    /// complete or not.
    pub fn get_timeout(&self, timeout: Duration) -> C::Output {
        let state = self.core.state.lock().unwrap();
        let (state, _) = self
            .core
            .done_cvar
            .wait_timeout_while(state, timeout, |s| !s.done)
            .unwrap();
        state.result.clone()
    }

    /// Cancel the future. Returns false if it was already done or cancelled.
    pub fn cancel(&self) -> bool {
        self.core.cancel()
    }

    pub fn is_done(&self) -> bool {
        self.core.state.lock().unwrap().done
    }

    pub fn is_cancelled(&self) -> bool {
        self.core.state.lock().unwrap().cancelled
    }
}

/// Collector for multi-part statistics replies: fragments append their
/// entries in receipt order, and the reply is complete exactly when the
/// more-fragments flag is clear.
pub struct StatisticsCollector;

impl ReplyCollector for StatisticsCollector {
    type Output = Vec<Statistic>;

    fn name(&self) -> &'static str {
        "StatisticsFuture"
    }

    fn collect(&self, acc: &mut Vec<Statistic>, msg: &Message) -> bool {
        match *msg {
            Message::StatsReply(ref reply) => {
                acc.extend(reply.stats.iter().cloned());
                !reply.more_replies()
            }
            ref other => {
                warn!(
                    "Statistics future fed unexpected message type {}",
                    other.msg_code()
                );
                false
            }
        }
    }
}

pub type StatisticsFuture = MessageFuture<StatisticsCollector>;

impl MessageFuture<StatisticsCollector> {
    pub fn new(
        provider: Weak<dyn OfpProvider>,
        sw: Arc<OfpSwitch>,
        transaction_id: Xid,
    ) -> StatisticsFuture {
        StatisticsFuture::new_with_timeout(provider, sw, transaction_id, DEFAULT_FUTURE_TIMEOUT)
    }

    pub fn new_with_timeout(
        provider: Weak<dyn OfpProvider>,
        sw: Arc<OfpSwitch>,
        transaction_id: Xid,
        timeout: Duration,
    ) -> StatisticsFuture {
        MessageFuture::with_timeout(
            provider,
            sw,
            MsgCode::StatsResp,
            transaction_id,
            StatisticsCollector,
            timeout,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use io_loop::IoLoop;
    use message::{FlowStats, StatsResp, StatsReqType, SwitchFeatures, REPLY_MORE};
    use mio::net::TcpStream;
    use mio::Token;
    use ofp_serialization::Codec0x01;
    use ofp_stream::OfpStream;
    use std::collections::HashMap;
    use std::net;
    use std::sync::Mutex;
    use std::time::Instant;

    /// Registry double standing in for the controller, with the same
    /// dispatch semantics (filter capability, STOP on match).
    struct MockProvider {
        message_listeners: Mutex<HashMap<MsgCode, Vec<Arc<dyn MessageListener>>>>,
        switch_listeners: Mutex<Vec<Arc<dyn SwitchListener>>>,
    }

    impl MockProvider {
        fn new() -> Arc<MockProvider> {
            Arc::new(MockProvider {
                message_listeners: Mutex::new(HashMap::new()),
                switch_listeners: Mutex::new(Vec::new()),
            })
        }

        fn dispatch_message(&self, sw: &Arc<OfpSwitch>, xid: Xid, msg: &Message) {
            let listeners = self
                .message_listeners
                .lock()
                .unwrap()
                .get(&msg.msg_code())
                .cloned()
                .unwrap_or_default();
            for listener in listeners {
                if let Some(filter) = listener.switch_filter() {
                    if !filter.is_interested(sw) {
                        continue;
                    }
                }
                if let Command::Stop = listener.receive(sw, xid, msg) {
                    break;
                }
            }
        }

        fn dispatch_removed_switch(&self, sw: &Arc<OfpSwitch>) {
            let listeners = self.switch_listeners.lock().unwrap().clone();
            for listener in listeners {
                listener.removed_switch(sw);
            }
        }

        fn message_listener_count(&self, typ: MsgCode) -> usize {
            self.message_listeners
                .lock()
                .unwrap()
                .get(&typ)
                .map(|l| l.len())
                .unwrap_or(0)
        }

        fn switch_listener_count(&self) -> usize {
            self.switch_listeners.lock().unwrap().len()
        }
    }

    impl OfpProvider for MockProvider {
        fn add_message_listener(&self, typ: MsgCode, listener: Arc<dyn MessageListener>) {
            self.message_listeners
                .lock()
                .unwrap()
                .entry(typ)
                .or_insert_with(Vec::new)
                .push(listener);
        }

        fn remove_message_listener(&self, typ: MsgCode, listener: &dyn MessageListener) {
            let target = listener as *const dyn MessageListener as *const ();
            if let Some(list) = self.message_listeners.lock().unwrap().get_mut(&typ) {
                list.retain(|l| Arc::as_ptr(l) as *const () != target);
            }
        }

        fn add_switch_listener(&self, listener: Arc<dyn SwitchListener>) {
            self.switch_listeners.lock().unwrap().push(listener);
        }

        fn remove_switch_listener(&self, listener: &dyn SwitchListener) {
            let target = listener as *const dyn SwitchListener as *const ();
            self.switch_listeners
                .lock()
                .unwrap()
                .retain(|l| Arc::as_ptr(l) as *const () != target);
        }
    }

    fn test_switch() -> (Arc<OfpSwitch>, net::TcpStream) {
        let listener = net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = net::TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        server.set_nonblocking(true).unwrap();

        let io_loop = Arc::new(IoLoop::new(0, Some(Duration::from_millis(500))).unwrap());
        let stream = Arc::new(OfpStream::new(
            TcpStream::from_std(server),
            Token(1),
            io_loop,
            Arc::new(Codec0x01),
            false,
        ));
        let sw = Arc::new(OfpSwitch::new(stream));
        sw.set_features(SwitchFeatures {
            datapath_id: 1,
            num_buffers: 0,
            num_tables: 1,
            capabilities: 0,
            actions: 0,
        });
        (sw, client)
    }

    fn statistics_reply(count: usize, more_replies: bool) -> Message {
        let mut stats = Vec::new();
        for i in 0..count {
            stats.push(Statistic::Flow(FlowStats {
                table_id: 0,
                priority: i as u16,
                idle_timeout: 0,
                hard_timeout: 0,
                duration_sec: 1,
                cookie: i as u64,
                packet_count: 0,
                byte_count: 0,
            }));
        }
        Message::StatsReply(StatsResp {
            req_type: StatsReqType::Flow,
            flags: if more_replies { REPLY_MORE } else { 0 },
            stats,
        })
    }

    fn registered_future(
        provider: &Arc<MockProvider>,
        sw: &Arc<OfpSwitch>,
        xid: Xid,
        timeout: Duration,
    ) -> StatisticsFuture {
        let as_provider: Arc<dyn OfpProvider> = provider.clone();
        let future =
            StatisticsFuture::new_with_timeout(Arc::downgrade(&as_provider), sw.clone(), xid, timeout);
        provider.add_message_listener(MsgCode::StatsResp, future.message_listener());
        provider.add_switch_listener(future.switch_listener());
        future
    }

    fn assert_registries_empty(provider: &Arc<MockProvider>) {
        assert_eq!(provider.message_listener_count(MsgCode::StatsResp), 0);
        assert_eq!(provider.switch_listener_count(), 0);
    }

    #[test]
    fn test_single_reply_resolves() {
        let provider = MockProvider::new();
        let (sw, _peer) = test_switch();
        let future = registered_future(&provider, &sw, 1, DEFAULT_FUTURE_TIMEOUT);

        provider.dispatch_message(&sw, 1, &statistics_reply(10, false));
        assert!(future.is_done());
        assert_eq!(future.get().len(), 10);
        assert_registries_empty(&provider);
    }

    #[test]
    fn test_fragments_aggregate_in_receipt_order() {
        let provider = MockProvider::new();
        let (sw, _peer) = test_switch();
        let future = registered_future(&provider, &sw, 1, DEFAULT_FUTURE_TIMEOUT);

        provider.dispatch_message(&sw, 1, &statistics_reply(10, true));
        assert!(!future.is_done());
        provider.dispatch_message(&sw, 1, &statistics_reply(5, false));

        let stats = future.get();
        assert_eq!(stats.len(), 15);
        assert_registries_empty(&provider);
    }

    #[test]
    fn test_blocked_waiter_released_on_completion() {
        let provider = MockProvider::new();
        let (sw, _peer) = test_switch();
        let future = registered_future(&provider, &sw, 1, DEFAULT_FUTURE_TIMEOUT);

        let replier = {
            let provider = provider.clone();
            let sw = sw.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                provider.dispatch_message(&sw, 1, &statistics_reply(3, false));
            })
        };
        // Blocks until the reply arrives on the other thread.
        let stats = future.get();
        replier.join().unwrap();
        assert_eq!(stats.len(), 3);
    }

    #[test]
    fn test_non_matching_transaction_id_is_ignored() {
        let provider = MockProvider::new();
        let (sw, _peer) = test_switch();
        let future = registered_future(&provider, &sw, 1, DEFAULT_FUTURE_TIMEOUT);

        provider.dispatch_message(&sw, 2, &statistics_reply(10, false));
        assert!(!future.is_done());
        assert_eq!(provider.message_listener_count(MsgCode::StatsResp), 1);

        provider.dispatch_message(&sw, 1, &statistics_reply(4, false));
        assert_eq!(future.get().len(), 4);
        assert_registries_empty(&provider);
    }

    #[test]
    fn test_matching_reply_stops_dispatch() {
        struct Recorder {
            invoked: Mutex<Vec<Xid>>,
        }
        impl MessageListener for Recorder {
            fn name(&self) -> &str {
                "recorder"
            }
            fn receive(&self, _sw: &Arc<OfpSwitch>, xid: Xid, _msg: &Message) -> Command {
                self.invoked.lock().unwrap().push(xid);
                Command::Continue
            }
        }

        let provider = MockProvider::new();
        let (sw, _peer) = test_switch();
        let future = registered_future(&provider, &sw, 1, DEFAULT_FUTURE_TIMEOUT);
        let recorder = Arc::new(Recorder {
            invoked: Mutex::new(Vec::new()),
        });
        provider.add_message_listener(MsgCode::StatsResp, recorder.clone());

        // A matching reply is consumed by the future.
        provider.dispatch_message(&sw, 1, &statistics_reply(1, false));
        assert!(recorder.invoked.lock().unwrap().is_empty());
        assert!(future.is_done());

        // A non-matching one flows past a (new) future to other listeners.
        let future2 = registered_future(&provider, &sw, 7, DEFAULT_FUTURE_TIMEOUT);
        provider.dispatch_message(&sw, 8, &statistics_reply(1, false));
        assert_eq!(*recorder.invoked.lock().unwrap(), vec![8]);
        assert!(!future2.is_done());
        future2.cancel();
    }

    #[test]
    fn test_cancellation_resolves_empty_and_deregisters() {
        let provider = MockProvider::new();
        let (sw, _peer) = test_switch();
        let future = registered_future(&provider, &sw, 1, DEFAULT_FUTURE_TIMEOUT);

        assert!(future.cancel());
        assert!(future.is_cancelled());
        assert!(future.get().is_empty());
        assert_registries_empty(&provider);

        // Cancelling twice is a no-op that reports not-cancelled.
        assert!(!future.cancel());
    }

    #[test]
    fn test_self_timeout_resolves_empty_and_deregisters() {
        let provider = MockProvider::new();
        let (sw, _peer) = test_switch();
        let future = registered_future(&provider, &sw, 1, Duration::from_secs(3));

        let started = Instant::now();
        let stats = future.get();
        let elapsed = started.elapsed();

        assert!(stats.is_empty());
        assert!(future.is_cancelled());
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_secs(10));
        assert_registries_empty(&provider);
    }

    #[test]
    fn test_switch_removal_releases_partial_result() {
        let provider = MockProvider::new();
        let (sw, _peer) = test_switch();
        let future = registered_future(&provider, &sw, 1, DEFAULT_FUTURE_TIMEOUT);

        provider.dispatch_message(&sw, 1, &statistics_reply(10, true));
        assert!(!future.is_done());

        provider.dispatch_removed_switch(&sw);
        let stats = future.get();
        assert_eq!(stats.len(), 10);
        assert!(!future.is_cancelled());
        assert_registries_empty(&provider);
    }

    #[test]
    fn test_removal_of_other_switch_is_ignored() {
        let provider = MockProvider::new();
        let (sw, _peer) = test_switch();
        let (other, _other_peer) = test_switch();
        let future = registered_future(&provider, &sw, 1, DEFAULT_FUTURE_TIMEOUT);

        provider.dispatch_removed_switch(&other);
        assert!(!future.is_done());
        assert_eq!(provider.switch_listener_count(), 1);

        // Replies from an unrelated switch do not match the filter either.
        provider.dispatch_message(&other, 1, &statistics_reply(5, false));
        assert!(!future.is_done());

        future.cancel();
        assert_registries_empty(&provider);
    }
}
