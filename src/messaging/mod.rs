pub mod channels;
pub mod event;
pub mod notification;
pub mod request;

pub use channels::{
    EventConsumer, EventProducer, RequestReceiver, RequestSender, create_event_channel,
    create_request_channel,
};
pub use event::EngineEvent;
pub use notification::{Notification, NotificationCategory, NotificationLevel};
pub use request::ControlRequest;
