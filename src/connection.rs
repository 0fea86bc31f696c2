//! Opaque handle over the transport connection: channel registry plus
//! description round state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{NegotiationError, Result};
use crate::signaling::{CandidateInit, SessionDescription};
use crate::transport::{
    AnswerOptions, ChannelOptions, DataChannel, GatheringState, OfferOptions, PeerTransport,
    TrackEndpoint, TransportError,
};

struct ChannelEntry {
    channel: Arc<dyn DataChannel>,
    options: ChannelOptions,
}

struct Inner {
    transport: Arc<dyn PeerTransport>,
    channels: Mutex<HashMap<String, ChannelEntry>>,
    /// Registration history, in insertion order. A label re-registered under
    /// a new channel appears here twice while the map keeps only the latest.
    labels: Mutex<Vec<String>>,
    local_set: AtomicBool,
    remote_set: AtomicBool,
    closed: AtomicBool,
}

/// Exclusively owned by one session; clones are cheap and only escape into
/// transport callbacks. All mutation of the registry and description state
/// goes through these operations.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<Inner>,
}

impl ConnectionHandle {
    pub fn new(transport: Arc<dyn PeerTransport>) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                channels: Mutex::new(HashMap::new()),
                labels: Mutex::new(Vec::new()),
                local_set: AtomicBool::new(false),
                remote_set: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn transport(&self) -> &Arc<dyn PeerTransport> {
        &self.inner.transport
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed.into());
        }
        Ok(())
    }

    fn register(&self, label: &str, channel: Arc<dyn DataChannel>, options: ChannelOptions) {
        self.inner.labels.lock().push(label.to_string());
        let replaced = self
            .inner
            .channels
            .lock()
            .insert(label.to_string(), ChannelEntry { channel, options });
        if replaced.is_some() {
            debug!("replaced data channel registered under label {label:?}");
        }
    }

    /// Create a data channel on the transport and register it. Re-using a
    /// label replaces the registry entry; the label history keeps both.
    pub async fn create_channel(
        &self,
        label: &str,
        options: &ChannelOptions,
    ) -> Result<Arc<dyn DataChannel>> {
        self.ensure_open()?;
        let channel = self
            .inner
            .transport
            .create_data_channel(label, options)
            .await?;
        self.register(label, channel.clone(), options.clone());
        Ok(channel)
    }

    /// Adopt a channel created by the remote side without invoking transport
    /// creation. Options are snapshotted from the channel's parameters.
    pub fn adopt_channel(&self, channel: Arc<dyn DataChannel>) {
        let label = channel.label();
        let options = channel.options();
        debug!("adopting remote data channel {label:?}");
        self.register(&label, channel, options);
    }

    /// The currently registered channel under `label`, if any.
    pub fn channel(&self, label: &str) -> Option<Arc<dyn DataChannel>> {
        self.inner
            .channels
            .lock()
            .get(label)
            .map(|entry| entry.channel.clone())
    }

    /// The creation options recorded for `label`, if registered.
    pub fn channel_options(&self, label: &str) -> Option<ChannelOptions> {
        self.inner
            .channels
            .lock()
            .get(label)
            .map(|entry| entry.options.clone())
    }

    /// Registration history, duplicates included.
    pub fn labels(&self) -> Vec<String> {
        self.inner.labels.lock().clone()
    }

    pub async fn create_offer(&self, options: &OfferOptions) -> Result<SessionDescription> {
        self.ensure_open()?;
        Ok(self.inner.transport.create_offer(options).await?)
    }

    pub async fn create_answer(&self, options: &AnswerOptions) -> Result<SessionDescription> {
        self.ensure_open()?;
        Ok(self.inner.transport.create_answer(options).await?)
    }

    /// Apply the local description for this round. At most one local
    /// description per negotiation round; the flag is recorded only once the
    /// transport accepts it.
    pub async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        self.ensure_open()?;
        if self.inner.local_set.load(Ordering::SeqCst) {
            return Err(NegotiationError::InvalidTransition(
                "local description already set for this negotiation round".to_string(),
            ));
        }
        self.inner
            .transport
            .set_local_description(description)
            .await?;
        self.inner.local_set.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Apply the remote description for this round, once.
    pub async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.ensure_open()?;
        if self.inner.remote_set.load(Ordering::SeqCst) {
            return Err(NegotiationError::InvalidTransition(
                "remote description already set for this negotiation round".to_string(),
            ));
        }
        self.inner
            .transport
            .set_remote_description(description)
            .await?;
        self.inner.remote_set.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub async fn local_description(&self) -> Option<SessionDescription> {
        self.inner.transport.local_description().await
    }

    pub async fn remote_description(&self) -> Option<SessionDescription> {
        self.inner.transport.remote_description().await
    }

    pub async fn add_ice_candidate(&self, candidate: CandidateInit) -> Result<()> {
        self.ensure_open()?;
        Ok(self.inner.transport.add_ice_candidate(candidate).await?)
    }

    pub fn ice_gathering_state(&self) -> GatheringState {
        self.inner.transport.ice_gathering_state()
    }

    pub async fn senders(&self) -> Vec<Arc<dyn TrackEndpoint>> {
        self.inner.transport.senders().await
    }

    pub async fn receivers(&self) -> Vec<Arc<dyn TrackEndpoint>> {
        self.inner.transport.receivers().await
    }

    pub async fn transceivers(&self) -> Vec<Arc<dyn TrackEndpoint>> {
        self.inner.transport.transceivers().await
    }

    /// Begin a new negotiation round (ICE restart): description flags reset,
    /// registry and log state are untouched.
    pub(crate) fn reset_round(&self) {
        self.inner.local_set.store(false, Ordering::SeqCst);
        self.inner.remote_set.store(false, Ordering::SeqCst);
    }

    /// Close registered channels, clear the registry, and release the
    /// transport. Safe to call under any error condition; the second and
    /// later calls are no-ops.
    pub async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let entries: Vec<ChannelEntry> = {
            let mut channels = self.inner.channels.lock();
            channels.drain().map(|(_, entry)| entry).collect()
        };
        for entry in entries {
            if let Err(err) = entry.channel.close().await {
                warn!("failed to close data channel {:?}: {err}", entry.channel.label());
            }
        }
        self.inner.labels.lock().clear();
        self.inner.transport.close().await?;
        Ok(())
    }
}
