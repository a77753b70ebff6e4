//! Channel event callbacks
//!
//! Call progress is reported through this trait. Callbacks run
//! synchronously from inside [`R2Channel::process_events`] (or from the
//! call-control operation that produced them) and receive the channel back,
//! so a handler may drive the call further on the spot, e.g. answer from
//! within [`ChannelEvents::on_call_accepted`]. The state machine snapshots
//! its state around such callbacks and skips its own follow-up work when a
//! handler already moved the call elsewhere.

use embedded_time::Clock;

use crate::chan::{OsError, R2Channel};
use crate::device::CasDevice;
use crate::proto::ProtocolErrorReason;
use crate::{CallMode, Category, DisconnectCause};

/// Host-side observer for one channel. All methods default to doing
/// nothing.
#[allow(unused_variables)]
pub trait ChannelEvents<D: CasDevice, M, C: Clock, X> {
    /// An inbound seize was acknowledged; the address exchange is starting.
    fn on_call_init(&mut self, chan: &mut R2Channel<'_, D, M, C, X>) {}

    /// The address exchange finished; the host decides whether to accept.
    fn on_call_offered(
        &mut self,
        chan: &mut R2Channel<'_, D, M, C, X>,
        ani: &str,
        dnis: &str,
        category: Category,
    ) {
    }

    /// The far end (or this side, once its accept tone is off) committed to
    /// the call.
    fn on_call_accepted(&mut self, chan: &mut R2Channel<'_, D, M, C, X>, mode: CallMode) {}

    /// The call is answered; PCM now flows to [`ChannelEvents::on_call_read`].
    fn on_call_answered(&mut self, chan: &mut R2Channel<'_, D, M, C, X>) {}

    /// The far end disconnected; the host should release the call.
    fn on_call_disconnect(
        &mut self,
        chan: &mut R2Channel<'_, D, M, C, X>,
        cause: DisconnectCause,
    ) {
    }

    /// The call is fully torn down and the line is idle again.
    fn on_call_end(&mut self, chan: &mut R2Channel<'_, D, M, C, X>) {}

    /// Companded PCM received after answer.
    fn on_call_read(&mut self, chan: &mut R2Channel<'_, D, M, C, X>, pcm: &[u8]) {}

    /// Span alarm raised (`true`) or cleared (`false`). Channel state is
    /// not reset.
    fn on_hardware_alarm(&mut self, chan: &mut R2Channel<'_, D, M, C, X>, raised: bool) {}

    /// A device operation failed; usually not fatal to the call.
    fn on_os_error(&mut self, chan: &mut R2Channel<'_, D, M, C, X>, error: OsError<D::Error>) {}

    /// The protocol went off the rails; the channel has been reset to idle.
    fn on_protocol_error(
        &mut self,
        chan: &mut R2Channel<'_, D, M, C, X>,
        reason: ProtocolErrorReason,
    ) {
    }

    /// The far end is blocking the line.
    fn on_line_blocked(&mut self, chan: &mut R2Channel<'_, D, M, C, X>) {}

    /// The far end returned to idle.
    fn on_line_idle(&mut self, chan: &mut R2Channel<'_, D, M, C, X>) {}
}
