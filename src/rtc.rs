//! Default transport implementation backed by the `webrtc` crate.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::warn;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::offer_answer_options::RTCOfferOptions;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::RTCRtpTransceiver;

use crate::config::RtcConfig;
use crate::signaling::{CandidateInit, SdpKind, SessionDescription};
use crate::transport::{
    AnswerOptions, CandidateSink, ChannelOptions, ChannelSink, DataChannel, GatheringSink,
    GatheringState, OfferOptions, PeerTransport, TrackEndpoint, TransportError,
};

/// [`PeerTransport`] over a `webrtc::RTCPeerConnection`.
pub struct RtcTransport {
    pc: Arc<RTCPeerConnection>,
    gathering: Arc<Mutex<GatheringState>>,
    candidate_sink: Arc<Mutex<Option<CandidateSink>>>,
    gathering_sink: Arc<Mutex<Option<GatheringSink>>>,
    channel_sink: Arc<Mutex<Option<ChannelSink>>>,
}

impl RtcTransport {
    pub async fn new(config: &RtcConfig) -> Result<Arc<Self>, TransportError> {
        let mut media = MediaEngine::default();
        media
            .register_default_codecs()
            .map_err(|err| TransportError::Setup(err.to_string()))?;
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media)
            .map_err(|err| TransportError::Setup(err.to_string()))?;
        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = config
            .stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .collect();
        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let pc = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .map_err(|err| TransportError::Setup(err.to_string()))?,
        );

        let transport = Self {
            pc,
            gathering: Arc::new(Mutex::new(GatheringState::New)),
            candidate_sink: Arc::new(Mutex::new(None)),
            gathering_sink: Arc::new(Mutex::new(None)),
            channel_sink: Arc::new(Mutex::new(None)),
        };
        transport.install_hooks();
        Ok(Arc::new(transport))
    }

    /// Wire the peer connection callbacks once; sink registration later only
    /// swaps the forwarding target, so no notification window is lost.
    fn install_hooks(&self) {
        let gathering = self.gathering.clone();
        let gathering_sink = self.gathering_sink.clone();
        let candidate_sink = self.candidate_sink.clone();
        self.pc
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                match candidate {
                    Some(candidate) => match candidate.to_json() {
                        Ok(init) => {
                            if let Some(sink) = candidate_sink.lock().as_ref() {
                                sink(CandidateInit {
                                    candidate: init.candidate,
                                    sdp_mid: init.sdp_mid,
                                    sdp_mline_index: init.sdp_mline_index,
                                });
                            }
                        }
                        Err(err) => warn!("failed to serialize ICE candidate: {err}"),
                    },
                    // A null candidate marks the end of gathering.
                    None => observe(&gathering, &gathering_sink, GatheringState::Complete),
                }
                Box::pin(async {})
            }));

        let gathering = self.gathering.clone();
        let gathering_sink = self.gathering_sink.clone();
        self.pc
            .on_ice_gathering_state_change(Box::new(move |state: RTCIceGathererState| {
                let mapped = match state {
                    RTCIceGathererState::Gathering => GatheringState::Gathering,
                    RTCIceGathererState::Complete => GatheringState::Complete,
                    _ => GatheringState::New,
                };
                observe(&gathering, &gathering_sink, mapped);
                Box::pin(async {})
            }));

        let channel_sink = self.channel_sink.clone();
        self.pc
            .on_data_channel(Box::new(move |channel: Arc<RTCDataChannel>| {
                let adapted: Arc<dyn DataChannel> = Arc::new(RtcChannel { inner: channel });
                if let Some(sink) = channel_sink.lock().as_ref() {
                    sink(adapted);
                }
                Box::pin(async {})
            }));
    }
}

/// Record a gathering observation (monotonic) and forward it.
fn observe(
    gathering: &Mutex<GatheringState>,
    sink: &Mutex<Option<GatheringSink>>,
    next: GatheringState,
) {
    {
        let mut current = gathering.lock();
        if next <= *current {
            return;
        }
        *current = next;
    }
    if let Some(sink) = sink.lock().as_ref() {
        sink(next);
    }
}

fn to_rtc_description(
    description: &SessionDescription,
) -> Result<RTCSessionDescription, TransportError> {
    match description.kind {
        SdpKind::Offer => RTCSessionDescription::offer(description.sdp.clone()),
        SdpKind::Answer => RTCSessionDescription::answer(description.sdp.clone()),
    }
    .map_err(|err| TransportError::rejected("session description", err))
}

fn from_rtc_description(
    description: RTCSessionDescription,
) -> Result<SessionDescription, TransportError> {
    let kind = match description.sdp_type {
        RTCSdpType::Offer => SdpKind::Offer,
        RTCSdpType::Answer => SdpKind::Answer,
        other => {
            return Err(TransportError::rejected(
                "session description",
                format!("unsupported sdp type {other}"),
            ))
        }
    };
    Ok(SessionDescription {
        kind,
        sdp: description.sdp,
    })
}

#[async_trait]
impl PeerTransport for RtcTransport {
    async fn create_data_channel(
        &self,
        label: &str,
        options: &ChannelOptions,
    ) -> Result<Arc<dyn DataChannel>, TransportError> {
        let init = RTCDataChannelInit {
            ordered: Some(options.ordered),
            max_packet_life_time: options.max_packet_life_time,
            max_retransmits: options.max_retransmits,
            protocol: options.protocol.clone(),
            // webrtc models "negotiated" as the pre-agreed channel id.
            negotiated: if options.negotiated { options.id } else { None },
        };
        let channel = self
            .pc
            .create_data_channel(label, Some(init))
            .await
            .map_err(|err| TransportError::rejected("create_data_channel", err))?;
        Ok(Arc::new(RtcChannel { inner: channel }))
    }

    async fn create_offer(
        &self,
        options: &OfferOptions,
    ) -> Result<SessionDescription, TransportError> {
        let rtc_options = RTCOfferOptions {
            ice_restart: options.ice_restart,
            ..Default::default()
        };
        let offer = self
            .pc
            .create_offer(Some(rtc_options))
            .await
            .map_err(|err| TransportError::rejected("create_offer", err))?;
        from_rtc_description(offer)
    }

    async fn create_answer(
        &self,
        _options: &AnswerOptions,
    ) -> Result<SessionDescription, TransportError> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|err| TransportError::rejected("create_answer", err))?;
        from_rtc_description(answer)
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), TransportError> {
        let description = to_rtc_description(&description)?;
        self.pc
            .set_local_description(description)
            .await
            .map_err(|err| TransportError::rejected("set_local_description", err))
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), TransportError> {
        let description = to_rtc_description(&description)?;
        self.pc
            .set_remote_description(description)
            .await
            .map_err(|err| TransportError::rejected("set_remote_description", err))
    }

    async fn add_ice_candidate(&self, candidate: CandidateInit) -> Result<(), TransportError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: None,
        };
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|err| TransportError::rejected("add_ice_candidate", err))
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        let description = self.pc.local_description().await?;
        from_rtc_description(description).ok()
    }

    async fn remote_description(&self) -> Option<SessionDescription> {
        let description = self.pc.remote_description().await?;
        from_rtc_description(description).ok()
    }

    fn ice_gathering_state(&self) -> GatheringState {
        *self.gathering.lock()
    }

    fn on_candidate(&self, sink: Option<CandidateSink>) {
        *self.candidate_sink.lock() = sink;
    }

    fn on_gathering_change(&self, sink: Option<GatheringSink>) {
        *self.gathering_sink.lock() = sink;
    }

    fn on_remote_channel(&self, sink: Option<ChannelSink>) {
        *self.channel_sink.lock() = sink;
    }

    async fn senders(&self) -> Vec<Arc<dyn TrackEndpoint>> {
        self.pc
            .get_senders()
            .await
            .into_iter()
            .map(|sender| Arc::new(RtcSender { inner: sender }) as Arc<dyn TrackEndpoint>)
            .collect()
    }

    async fn receivers(&self) -> Vec<Arc<dyn TrackEndpoint>> {
        self.pc
            .get_receivers()
            .await
            .into_iter()
            .map(|receiver| Arc::new(RtcReceiver { inner: receiver }) as Arc<dyn TrackEndpoint>)
            .collect()
    }

    async fn transceivers(&self) -> Vec<Arc<dyn TrackEndpoint>> {
        self.pc
            .get_transceivers()
            .await
            .into_iter()
            .map(|transceiver| {
                Arc::new(RtcTransceiver { inner: transceiver }) as Arc<dyn TrackEndpoint>
            })
            .collect()
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.pc
            .close()
            .await
            .map_err(|err| TransportError::rejected("close", err))
    }
}

/// [`DataChannel`] over a `webrtc::RTCDataChannel`.
pub struct RtcChannel {
    inner: Arc<RTCDataChannel>,
}

#[async_trait]
impl DataChannel for RtcChannel {
    fn label(&self) -> String {
        self.inner.label().to_string()
    }

    fn options(&self) -> ChannelOptions {
        let max_packet_life_time = match self.inner.max_packet_lifetime() {
            0 => None,
            value => Some(value),
        };
        let max_retransmits = match self.inner.max_retransmits() {
            0 => None,
            value => Some(value),
        };
        let protocol = match self.inner.protocol() {
            "" => None,
            value => Some(value.to_string()),
        };
        ChannelOptions {
            ordered: self.inner.ordered(),
            max_packet_life_time,
            max_retransmits,
            protocol,
            negotiated: self.inner.negotiated(),
            id: Some(self.inner.id()),
        }
    }

    async fn send_text(&self, text: &str) -> Result<(), TransportError> {
        self.inner
            .send_text(text)
            .await
            .map(|_| ())
            .map_err(|err| TransportError::rejected("send_text", err))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.inner
            .close()
            .await
            .map_err(|err| TransportError::rejected("close", err))
    }
}

struct RtcSender {
    inner: Arc<RTCRtpSender>,
}

#[async_trait]
impl TrackEndpoint for RtcSender {
    async fn stop(&self) -> Result<(), TransportError> {
        self.inner
            .stop()
            .await
            .map_err(|err| TransportError::rejected("stop sender", err))
    }
}

struct RtcReceiver {
    inner: Arc<RTCRtpReceiver>,
}

#[async_trait]
impl TrackEndpoint for RtcReceiver {
    async fn stop(&self) -> Result<(), TransportError> {
        self.inner
            .stop()
            .await
            .map_err(|err| TransportError::rejected("stop receiver", err))
    }
}

struct RtcTransceiver {
    inner: Arc<RTCRtpTransceiver>,
}

#[async_trait]
impl TrackEndpoint for RtcTransceiver {
    async fn stop(&self) -> Result<(), TransportError> {
        self.inner
            .stop()
            .await
            .map_err(|err| TransportError::rejected("stop transceiver", err))
    }
}
