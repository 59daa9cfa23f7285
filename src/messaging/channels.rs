// Communication channels
// Lock-free SPSC ring for engine events, MPSC queue for out-of-band requests

use crate::messaging::event::EngineEvent;
use crate::messaging::request::ControlRequest;
use crossbeam_channel::{Receiver, Sender};
use ringbuf::traits::{Producer, Split};
use ringbuf::HeapRb;

pub type EventProducer = ringbuf::HeapProd<EngineEvent>;
pub type EventConsumer = ringbuf::HeapCons<EngineEvent>;

pub fn create_event_channel(capacity: usize) -> (EventProducer, EventConsumer) {
    let rb = HeapRb::<EngineEvent>::new(capacity.max(1));
    rb.split()
}

/// Push an event, dropping it when the consumer is behind
/// Returns false if the event was dropped
pub fn publish(producer: &mut EventProducer, event: EngineEvent) -> bool {
    match producer.try_push(event) {
        Ok(()) => true,
        Err(event) => {
            log::debug!("Event channel full, dropping {:?}", event);
            false
        }
    }
}

pub type RequestSender = Sender<ControlRequest>;
pub type RequestReceiver = Receiver<ControlRequest>;

/// Unbounded queue; any thread (signal handler glue, CLI) may send
pub fn create_request_channel() -> (RequestSender, RequestReceiver) {
    crossbeam_channel::unbounded()
}
