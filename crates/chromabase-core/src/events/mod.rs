//! Change notification fan-out.
//!
//! This module provides:
//! - [`ChangeEvent`], produced once per successful mutation
//! - the webhook registry and dispatcher for external subscribers
//! - the live broadcaster for connected stream clients
//! - [`NotificationHub`], which owns all of the above

mod event;
mod hub;
mod live;
mod webhook;

pub use event::{ChangeEvent, ChangeKind, StreamPayload, WebhookPayload};
pub use hub::{HubStats, NotificationHub, PublishReport};
pub use live::{
    BroadcastReport, LiveBroadcaster, LiveFrame, SubscriberHandle, SubscriberState,
    CONNECTED_EVENT,
};
pub use webhook::{
    verify_signature, DispatchReport, WebhookDelivery, WebhookDispatcher, WebhookRegistry,
    DELIVERY_HEADER, EVENT_HEADER, SIGNATURE_HEADER,
};
