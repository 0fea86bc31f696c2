//! The webrtc-backed transport, exercised without requiring network
//! reachability: description creation and exchange work offline, only
//! candidate gathering needs real interfaces.

use std::time::Duration;

use anyhow::Result;
use peerlink::{
    AnswerOptions, ChannelOptions, ConnectionHandle, DataChannel, InitiatorSession, OfferOptions,
    ResponderSession, RtcConfig, RtcTransport, SdpKind,
};
use tokio::time::timeout;

fn offline_config() -> RtcConfig {
    RtcConfig {
        stun_servers: Vec::new(),
    }
}

#[tokio::test]
async fn offer_creation_and_local_description() -> Result<()> {
    let transport = RtcTransport::new(&offline_config()).await?;
    let conn = ConnectionHandle::new(transport);

    let channel = conn.create_channel("chat", &ChannelOptions::default()).await?;
    assert_eq!(channel.label(), "chat");
    assert_eq!(conn.labels(), vec!["chat".to_string()]);

    let offer = conn.create_offer(&OfferOptions::default()).await?;
    assert_eq!(offer.kind, SdpKind::Offer);
    assert!(offer.sdp.contains("v=0"));

    conn.set_local_description(offer).await?;
    assert!(conn.local_description().await.is_some());

    conn.close().await?;
    conn.close().await?;
    Ok(())
}

#[tokio::test]
async fn description_exchange_without_gathering() -> Result<()> {
    let a = ConnectionHandle::new(RtcTransport::new(&offline_config()).await?);
    let b = ConnectionHandle::new(RtcTransport::new(&offline_config()).await?);

    a.create_channel("chat", &ChannelOptions::default()).await?;
    let offer = a.create_offer(&OfferOptions::default()).await?;
    a.set_local_description(offer.clone()).await?;

    b.set_remote_description(offer).await?;
    let answer = b.create_answer(&AnswerOptions::default()).await?;
    assert_eq!(answer.kind, SdpKind::Answer);
    b.set_local_description(answer.clone()).await?;

    a.set_remote_description(answer).await?;
    assert!(a.remote_description().await.is_some());

    a.close().await?;
    b.close().await?;
    Ok(())
}

#[tokio::test]
#[ignore = "candidate gathering needs host network interfaces"]
async fn full_handshake_between_two_rtc_sessions() -> Result<()> {
    let initiator = InitiatorSession::new(RtcTransport::new(&offline_config()).await?);
    let responder = ResponderSession::new(RtcTransport::new(&offline_config()).await?);

    let offer_text = timeout(
        Duration::from_secs(20),
        initiator.propose_data_channel("chat", &ChannelOptions::default(), &OfferOptions::default()),
    )
    .await??;
    assert!(offer_text.starts_with("{\"type\":\"sdp\",\"sdp\":{\"type\":\"offer\""));

    responder.accept_offer(&offer_text).await?;
    timeout(Duration::from_secs(20), responder.wait_until_complete()).await?;
    let answer_text = responder.answer();
    assert!(answer_text.starts_with("{\"type\":\"sdp\",\"sdp\":{\"type\":\"answer\""));

    initiator.accept_answer(&answer_text).await?;

    initiator.close().await?;
    responder.close().await?;
    Ok(())
}
