//! Streams whose reservation settles on the terminal usage event.

use crate::{ConversationEvent, EventIter, EventStream};
use futures_util::Stream;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tollgate_error::RemoteError;
use tollgate_rate_limit::Reservation;
use tracing::{debug, warn};

type EventItem = Result<ConversationEvent, RemoteError>;

/// Settle or release `reservation` depending on the item just read.
fn meter(reservation: &mut Option<Reservation<'_>>, item: Option<&EventItem>) {
    let settlement = match item {
        Some(Ok(ConversationEvent::Done { usage })) => {
            reservation.take().map(|r| r.settle(usage.total_tokens()))
        }
        Some(Ok(_)) => None,
        Some(Err(e)) => reservation.take().map(|r| {
            warn!(error = %e, "Stream failed before reporting usage, releasing reservation");
            r.release()
        }),
        None => reservation.take().map(|r| {
            warn!("Stream ended without reporting usage, releasing reservation");
            r.release()
        }),
    };

    match settlement {
        Some(Ok(credited)) => debug!(credited, "Stream reservation settled"),
        Some(Err(e)) => warn!(error = %e, "Failed to settle stream reservation"),
        None => {}
    }
}

/// Blocking event stream holding its reservation until usage is reported.
///
/// The reservation settles against the usage of the `conversation.response.done`
/// event. An error item, an end without that event, or dropping the stream early
/// releases the reservation in full.
pub struct MeteredEvents<'a> {
    events: EventIter,
    reservation: Option<Reservation<'a>>,
}

impl<'a> MeteredEvents<'a> {
    pub(crate) fn new(events: EventIter, reservation: Reservation<'a>) -> Self {
        Self {
            events,
            reservation: Some(reservation),
        }
    }

    /// Whether the reservation has been settled or released.
    pub fn is_settled(&self) -> bool {
        self.reservation.is_none()
    }
}

impl Iterator for MeteredEvents<'_> {
    type Item = EventItem;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.events.next();
        meter(&mut self.reservation, item.as_ref());
        item
    }
}

impl std::fmt::Debug for MeteredEvents<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeteredEvents")
            .field("reservation", &self.reservation)
            .finish_non_exhaustive()
    }
}

/// Async counterpart of [`MeteredEvents`].
pub struct MeteredEventStream<'a> {
    events: EventStream,
    reservation: Option<Reservation<'a>>,
}

impl<'a> MeteredEventStream<'a> {
    pub(crate) fn new(events: EventStream, reservation: Reservation<'a>) -> Self {
        Self {
            events,
            reservation: Some(reservation),
        }
    }

    /// Whether the reservation has been settled or released.
    pub fn is_settled(&self) -> bool {
        self.reservation.is_none()
    }
}

impl Stream for MeteredEventStream<'_> {
    type Item = EventItem;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let item = ready!(this.events.as_mut().poll_next(cx));
        meter(&mut this.reservation, item.as_ref());
        Poll::Ready(item)
    }
}

impl std::fmt::Debug for MeteredEventStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeteredEventStream")
            .field("reservation", &self.reservation)
            .finish_non_exhaustive()
    }
}
