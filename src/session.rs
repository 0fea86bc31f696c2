//! Negotiation sessions: the shared round state machine and the two
//! endpoint roles built on it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::connection::ConnectionHandle;
use crate::error::{NegotiationError, Result};
use crate::signaling::{CandidateInit, SessionDescription, SignalingEvent, SignalingLog};
use crate::transport::{
    AnswerOptions, ChannelOptions, DataChannel, GatheringState, OfferOptions, PeerTransport,
    TrackEndpoint,
};

/// Endpoint role within a negotiation round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Initiator => write!(f, "initiator"),
            Role::Responder => write!(f, "responder"),
        }
    }
}

/// Progress of a single negotiation round. Ordered: a session never moves
/// backward within a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Idle,
    LocalDescriptionSet,
    GatheringCandidates,
    Complete,
}

/// Outbound log plus the staging needed to keep the description line first:
/// candidates discovered while the local description is still being applied
/// are staged and flushed right after it. One lock serializes all appends.
struct OutboundLog {
    log: SignalingLog,
    staged: Vec<CandidateInit>,
    description_logged: bool,
}

struct SessionCore {
    role: Role,
    conn: ConnectionHandle,
    outbound: Arc<Mutex<OutboundLog>>,
    /// Remote candidates received before any remote description exists.
    pending_remote: Mutex<Vec<CandidateInit>>,
    phase: Arc<watch::Sender<Phase>>,
    gathering: Arc<watch::Sender<GatheringState>>,
    closed: Arc<AtomicBool>,
}

/// Monotonic gathering observation shared between the sink closure and the
/// core. A repeated or backward notification is a no-op, so a duplicate
/// completion signal cannot resolve a second wait.
fn observe_gathering(
    gathering: &watch::Sender<GatheringState>,
    phase: &watch::Sender<Phase>,
    next: GatheringState,
) {
    let advanced = gathering.send_if_modified(|current| {
        if next > *current {
            *current = next;
            true
        } else {
            false
        }
    });
    if advanced && next == GatheringState::Complete {
        advance_phase(phase, Phase::Complete);
    }
}

fn advance_phase(phase: &watch::Sender<Phase>, next: Phase) {
    phase.send_if_modified(|current| {
        if next > *current {
            *current = next;
            true
        } else {
            false
        }
    });
}

impl SessionCore {
    fn new(role: Role, transport: Arc<dyn PeerTransport>) -> Self {
        let (phase, _) = watch::channel(Phase::Idle);
        let (gathering, _) = watch::channel(GatheringState::New);
        Self {
            role,
            conn: ConnectionHandle::new(transport),
            outbound: Arc::new(Mutex::new(OutboundLog {
                log: SignalingLog::new(),
                staged: Vec::new(),
                description_logged: false,
            })),
            pending_remote: Mutex::new(Vec::new()),
            phase: Arc::new(phase),
            gathering: Arc::new(gathering),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    fn gathering_state(&self) -> GatheringState {
        *self.gathering.borrow()
    }

    fn outbound_signal(&self) -> String {
        self.outbound.lock().log.render()
    }

    /// Install the candidate and gathering sinks on the transport. Candidates
    /// seen before the description line lands are staged by the sink; the
    /// closed flag guarantees no append after teardown.
    fn install_sinks(&self) {
        let outbound = self.outbound.clone();
        let closed = self.closed.clone();
        self.conn
            .transport()
            .on_candidate(Some(Box::new(move |candidate| {
                if closed.load(Ordering::SeqCst) {
                    return;
                }
                let mut guard = outbound.lock();
                if guard.description_logged {
                    guard.log.append(&SignalingEvent::candidate(candidate));
                } else {
                    guard.staged.push(candidate);
                }
            })));

        let gathering = self.gathering.clone();
        let phase = self.phase.clone();
        let closed = self.closed.clone();
        self.conn
            .transport()
            .on_gathering_change(Some(Box::new(move |state| {
                if closed.load(Ordering::SeqCst) {
                    return;
                }
                observe_gathering(&gathering, &phase, state);
            })));
    }

    /// Apply `description` as the local description, log it, and start the
    /// gathering wait for this round.
    async fn apply_local_description(&self, description: SessionDescription) -> Result<()> {
        self.install_sinks();
        self.conn.set_local_description(description).await?;
        advance_phase(&self.phase, Phase::LocalDescriptionSet);

        // The transport may not surface a local description; in that case
        // nothing is appended and candidates flush behind an empty slot.
        let local = self.conn.local_description().await;
        {
            let mut guard = self.outbound.lock();
            if let Some(description) = local {
                debug!(role = %self.role, kind = %description.kind, "logging local description");
                guard.log.append(&SignalingEvent::description(description));
            }
            guard.description_logged = true;
            let staged = std::mem::take(&mut guard.staged);
            for candidate in staged {
                guard.log.append(&SignalingEvent::candidate(candidate));
            }
        }

        advance_phase(&self.phase, Phase::GatheringCandidates);
        // A transport that is already complete transitions immediately;
        // without this check a completion signaled before the subscription
        // would never resolve the wait.
        observe_gathering(&self.gathering, &self.phase, self.conn.ice_gathering_state());
        Ok(())
    }

    /// One-shot wait for gathering completion in this round. Resolves
    /// immediately if gathering already completed.
    async fn wait_until_complete(&self) {
        let mut rx = self.gathering.subscribe();
        let _ = rx.wait_for(|state| *state == GatheringState::Complete).await;
    }

    /// Apply remote events in log order, buffering candidates until a remote
    /// description exists. The first failure aborts; events already applied
    /// stay applied.
    async fn accept_remote_text(&self, text: &str) -> Result<()> {
        for item in SignalingLog::parse_lines(text) {
            self.apply_remote_event(item?).await?;
        }
        Ok(())
    }

    async fn apply_remote_event(&self, event: SignalingEvent) -> Result<()> {
        match event {
            SignalingEvent::Sdp { sdp } => {
                debug!(role = %self.role, kind = %sdp.kind, "applying remote description");
                self.conn.set_remote_description(sdp).await?;
                self.flush_pending_candidates().await?;
            }
            SignalingEvent::Ice { candidate } => {
                if self.conn.remote_description().await.is_some() {
                    self.conn.add_ice_candidate(candidate).await?;
                } else {
                    debug!(role = %self.role, "no remote description yet, buffering candidate");
                    self.pending_remote.lock().push(candidate);
                }
            }
        }
        Ok(())
    }

    async fn flush_pending_candidates(&self) -> Result<()> {
        let pending: Vec<CandidateInit> = std::mem::take(&mut *self.pending_remote.lock());
        for candidate in pending {
            self.conn.add_ice_candidate(candidate).await?;
        }
        Ok(())
    }

    /// Begin a new negotiation round after an ICE restart. The outbound log
    /// stays append-only across rounds.
    fn begin_restart_round(&self) {
        debug!(role = %self.role, "starting a new negotiation round (ice restart)");
        self.conn.reset_round();
        self.gathering.send_replace(GatheringState::New);
        self.phase.send_replace(Phase::Idle);
        self.outbound.lock().description_logged = false;
    }

    async fn send(&self, label: &str, text: &str) -> Result<()> {
        let channel = self
            .conn
            .channel(label)
            .ok_or_else(|| NegotiationError::UnknownChannel(label.to_string()))?;
        channel.send_text(text).await?;
        Ok(())
    }

    /// Tear down: clear every transport sink (idempotent even if never
    /// installed), stop track producers and consumers, close the handle.
    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        let transport = self.conn.transport();
        transport.on_candidate(None);
        transport.on_gathering_change(None);
        transport.on_remote_channel(None);

        for sender in transport.senders().await {
            if let Err(err) = sender.stop().await {
                warn!("failed to stop track producer: {err}");
            }
        }
        for receiver in transport.receivers().await {
            if let Err(err) = receiver.stop().await {
                warn!("failed to stop track consumer: {err}");
            }
        }

        self.conn.close().await
    }
}

/// The endpoint that proposes a session. Drives channel creation, the offer,
/// and the gathering wait; accepts the answer text produced by the remote
/// [`ResponderSession`].
pub struct InitiatorSession {
    core: SessionCore,
    answer_text: Mutex<String>,
}

impl InitiatorSession {
    pub fn new(transport: Arc<dyn PeerTransport>) -> Self {
        Self {
            core: SessionCore::new(Role::Initiator, transport),
            answer_text: Mutex::new(String::new()),
        }
    }

    /// Create a data channel, propose an offer, wait for candidate gathering
    /// to complete, and return the rendered signaling text.
    pub async fn propose_data_channel(
        &self,
        label: &str,
        channel_options: &ChannelOptions,
        offer_options: &OfferOptions,
    ) -> Result<String> {
        self.core.conn.create_channel(label, channel_options).await?;
        self.propose(offer_options).await
    }

    /// Propose an offer without creating a channel, for sessions whose
    /// tracks were already attached at the transport level.
    pub async fn propose_media_offer(&self, offer_options: &OfferOptions) -> Result<String> {
        self.propose(offer_options).await
    }

    async fn propose(&self, offer_options: &OfferOptions) -> Result<String> {
        if offer_options.ice_restart {
            self.core.begin_restart_round();
        }
        let offer = self.core.conn.create_offer(offer_options).await?;
        self.core.apply_local_description(offer).await?;
        self.core.wait_until_complete().await;
        Ok(self.core.outbound_signal())
    }

    /// Store the remote answer text verbatim and apply its events in order.
    /// Fails with [`NegotiationError::InvalidTransition`] if no local offer
    /// has been applied yet.
    pub async fn accept_answer(&self, text: &str) -> Result<()> {
        *self.answer_text.lock() = text.to_string();
        if self.core.conn.local_description().await.is_none() {
            return Err(NegotiationError::InvalidTransition(
                "answer received before a local offer was applied".to_string(),
            ));
        }
        self.core.accept_remote_text(text).await
    }

    /// The rendered outbound signal, possibly partial before
    /// [`InitiatorSession::wait_until_complete`] resolves.
    pub fn offer(&self) -> String {
        self.core.outbound_signal()
    }

    /// The stored answer text, empty until an answer has been accepted.
    pub fn answer(&self) -> String {
        self.answer_text.lock().clone()
    }

    pub fn role(&self) -> Role {
        self.core.role
    }

    pub fn phase(&self) -> Phase {
        self.core.phase()
    }

    pub fn gathering_state(&self) -> GatheringState {
        self.core.gathering_state()
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.core.conn
    }

    pub async fn wait_until_complete(&self) {
        self.core.wait_until_complete().await;
    }

    /// Send text over a registered data channel.
    pub async fn send(&self, label: &str, text: &str) -> Result<()> {
        self.core.send(label, text).await
    }

    pub async fn close(&self) -> Result<()> {
        self.core.close().await
    }
}

/// The endpoint that accepts a proposed session and produces the answer.
pub struct ResponderSession {
    core: SessionCore,
    offer_text: Mutex<String>,
}

impl ResponderSession {
    pub fn new(transport: Arc<dyn PeerTransport>) -> Self {
        let core = SessionCore::new(Role::Responder, transport);

        // Channels announced by the remote side are adopted into the
        // registry as they arrive.
        let conn = core.conn.clone();
        let closed = core.closed.clone();
        core.conn
            .transport()
            .on_remote_channel(Some(Box::new(move |channel| {
                if closed.load(Ordering::SeqCst) {
                    return;
                }
                conn.adopt_channel(channel);
            })));

        Self {
            core,
            offer_text: Mutex::new(String::new()),
        }
    }

    /// Store the remote offer text verbatim, apply its events in order
    /// (buffering candidates that precede the offer), then create and apply
    /// the answer. If the text carried no description the answer step is
    /// skipped and buffered candidates wait for a later call.
    pub async fn accept_offer(&self, text: &str) -> Result<()> {
        *self.offer_text.lock() = text.to_string();
        self.core.accept_remote_text(text).await?;

        if self.core.conn.remote_description().await.is_some()
            && self.core.conn.local_description().await.is_none()
        {
            let answer = self.core.conn.create_answer(&AnswerOptions::default()).await?;
            self.core.apply_local_description(answer).await?;
        }
        Ok(())
    }

    /// The raw inbound offer text as received, preserved for audit.
    pub fn offer(&self) -> String {
        self.offer_text.lock().clone()
    }

    /// The rendered outbound signal; contains the answer description once
    /// an offer has been accepted.
    pub fn answer(&self) -> String {
        self.core.outbound_signal()
    }

    pub fn role(&self) -> Role {
        self.core.role
    }

    pub fn phase(&self) -> Phase {
        self.core.phase()
    }

    pub fn gathering_state(&self) -> GatheringState {
        self.core.gathering_state()
    }

    pub fn connection(&self) -> &ConnectionHandle {
        &self.core.conn
    }

    pub async fn wait_until_complete(&self) {
        self.core.wait_until_complete().await;
    }

    /// Send text over a registered data channel.
    pub async fn send(&self, label: &str, text: &str) -> Result<()> {
        self.core.send(label, text).await
    }

    pub async fn close(&self) -> Result<()> {
        self.core.close().await
    }
}
