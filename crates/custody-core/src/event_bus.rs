//! Broadcast channel for custody events.

use custody_types::CustodyEvent;
use tokio::sync::broadcast;

/// Fan-out of [`CustodyEvent`]s to any number of subscribers.
///
/// Publishing never blocks; slow subscribers lag and lose the oldest events.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<CustodyEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<CustodyEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event; fails only when nobody is subscribed.
	pub fn publish(
		&self,
		event: CustodyEvent,
	) -> Result<usize, broadcast::error::SendError<CustodyEvent>> {
		self.sender.send(event)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use custody_types::Stage;

	#[tokio::test]
	async fn test_subscribers_receive_published_events() {
		let bus = EventBus::new(8);
		let mut first = bus.subscribe();
		let mut second = bus.subscribe();

		let event = CustodyEvent::TransferRecorded {
			order_id: 1,
			stage: Stage::Create,
			reference: "abc".into(),
		};
		assert_eq!(bus.publish(event.clone()).unwrap(), 2);

		assert_eq!(first.recv().await.unwrap(), event);
		assert_eq!(second.recv().await.unwrap(), event);
	}

	#[test]
	fn test_publish_without_subscribers_is_an_error() {
		let bus = EventBus::new(8);
		let result = bus.publish(CustodyEvent::TransitionRejected {
			order_id: 1,
			stage: Stage::Confirm,
			reason: "none".into(),
		});
		assert!(result.is_err());
	}
}
