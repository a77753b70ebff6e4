//! Backward-side call setup: seize ack, address collection, offer,
//! accept/answer and verdict-tone teardown.

mod common;

use common::{deliver_bits, deliver_tone_on, peer_pulse, rig, Ev, Recorder};
use mfcr2::{
    CallMode, CallState, Category, DisconnectCause, MfTone, ProtocolErrorReason, R2Context,
    Variant,
};

// ITU inbound, two DNIS digits, no ANI, accepted with charge and answered.
#[test]
fn itu_inbound_accept_with_charge() {
    let ctx = R2Context::new(Variant::Itu, 0, 2).unwrap();
    let rig = rig();
    let mut chan = rig.channel(&ctx);
    let mut rec = Recorder::new();
    rec.accept_on_offer = Some(CallMode::WithCharge);
    rec.answer_on_accept = true;

    // far end seizes; we ack with 0xC and report the new call
    deliver_bits(&mut chan, &mut rec, &rig, 0x0);
    assert_eq!(rec.log, vec![Ev::CallInit]);
    assert_eq!(rig.dev.last_tx_masked(0xC), Some(0xC));
    assert_eq!(*rig.mf_tx.write_inits.borrow(), vec![false]);
    assert_eq!(*rig.mf_rx.read_inits.borrow(), vec![true]);

    // first digit, then our next-DNIS request (tone 1)
    peer_pulse(&mut chan, &mut rec, &rig, MfTone::Tone5);
    assert_eq!(chan.dnis(), "5");
    // second digit completes the DNIS; we ask for the category (tone 5)
    peer_pulse(&mut chan, &mut rec, &rig, MfTone::Tone3);
    assert_eq!(chan.dnis(), "53");
    // category arrives; nothing else to collect, we request Group II
    peer_pulse(&mut chan, &mut rec, &rig, MfTone::Tone1);
    // the Group II tone completes the offer
    deliver_tone_on(&mut chan, &mut rec, &rig, MfTone::Tone6);
    assert!(rec.has(&Ev::Offered {
        ani: String::new(),
        dnis: "53".to_owned(),
        category: Category::NationalSubscriber,
    }));
    assert_eq!(chan.call_state(), CallState::Offered);
    // the recorder accepted inline; our accept tone is up
    assert_eq!(chan.tx_mf_tone(), Some(MfTone::Tone6));
    assert_eq!(
        rig.mf_tx.tones_selected(),
        vec![
            MfTone::Tone1,
            MfTone::Tone5,
            MfTone::Tone3,
            MfTone::Tone6
        ]
    );

    // far end mutes; accept is reported only after the wait time
    common::deliver_tone_off(&mut chan, &mut rec, &rig);
    assert_eq!(chan.call_state(), CallState::Accepted);
    assert!(!rec.has(&Ev::Accepted(CallMode::WithCharge)));
    rig.advance(151);
    chan.process_events(&mut rec);
    assert!(rec.has(&Ev::Accepted(CallMode::WithCharge)));
    // the recorder answered inline
    assert!(rec.has(&Ev::Answered));
    assert_eq!(chan.call_state(), CallState::Answered);
    assert_eq!(rig.dev.last_tx_masked(0xC), Some(0x4));
}

// Brazil inbound rejected busy: Group B tone 2, far end clears forward.
#[test]
fn brazil_inbound_busy_disconnect() {
    let ctx = R2Context::new(Variant::Brazil, 0, 2).unwrap();
    let rig = rig();
    let mut chan = rig.channel(&ctx);
    let mut rec = Recorder::new();
    rec.disconnect_on_offer = Some(DisconnectCause::BusyNumber);
    rec.release_on_disconnect = true;

    deliver_bits(&mut chan, &mut rec, &rig, 0x0);
    peer_pulse(&mut chan, &mut rec, &rig, MfTone::Tone1);
    peer_pulse(&mut chan, &mut rec, &rig, MfTone::Tone2);
    peer_pulse(&mut chan, &mut rec, &rig, MfTone::Tone1);
    deliver_tone_on(&mut chan, &mut rec, &rig, MfTone::Tone1);
    // the disconnect tone is up; the call clears when the far end does
    assert_eq!(chan.call_state(), CallState::Offered);
    // Brazil busy is tone 2
    assert_eq!(rig.mf_tx.tones_selected().last(), Some(&MfTone::Tone2));

    // far end clears forward; the recorder releases and the line idles
    common::deliver_tone_off(&mut chan, &mut rec, &rig);
    deliver_bits(&mut chan, &mut rec, &rig, 0x8);
    assert!(rec.has(&Ev::Disconnect(DisconnectCause::NormalClearing)));
    assert!(rec.has(&Ev::End));
    assert_eq!(chan.call_state(), CallState::Idle);
    assert_eq!(rig.dev.last_tx_masked(0xC), Some(0x8));
}

// A second tone with no silence in between breaks the compelled sequence.
#[test]
fn broken_mf_sequence_resets_to_idle() {
    let ctx = R2Context::new(Variant::Itu, 0, 4).unwrap();
    let rig = rig();
    let mut chan = rig.channel(&ctx);
    let mut rec = Recorder::new();

    deliver_bits(&mut chan, &mut rec, &rig, 0x0);
    deliver_tone_on(&mut chan, &mut rec, &rig, MfTone::Tone5);
    deliver_tone_on(&mut chan, &mut rec, &rig, MfTone::Tone3);
    assert!(rec.has(&Ev::ProtocolError(ProtocolErrorReason::BrokenMfSequence)));
    assert_eq!(chan.call_state(), CallState::Idle);
    assert_eq!(rig.dev.last_tx_masked(0xC), Some(0x8));
}

// A repeated verdict for the tone already being handled carries nothing.
#[test]
fn continuous_tone_is_reported_once() {
    let ctx = R2Context::new(Variant::Itu, 0, 4).unwrap();
    let rig = rig();
    let mut chan = rig.channel(&ctx);
    let mut rec = Recorder::new();

    deliver_bits(&mut chan, &mut rec, &rig, 0x0);
    deliver_tone_on(&mut chan, &mut rec, &rig, MfTone::Tone5);
    deliver_tone_on(&mut chan, &mut rec, &rig, MfTone::Tone5);
    assert_eq!(chan.dnis(), "5");
    assert!(!rec
        .log
        .iter()
        .any(|ev| matches!(ev, Ev::ProtocolError(_))));
}

// Even a zero-digit DNIS expectation terminates after the first digit.
#[test]
fn zero_max_dnis_still_takes_one_digit() {
    let ctx = R2Context::new(Variant::Itu, 0, 0).unwrap();
    let rig = rig();
    let mut chan = rig.channel(&ctx);
    let mut rec = Recorder::new();

    deliver_bits(&mut chan, &mut rec, &rig, 0x0);
    deliver_tone_on(&mut chan, &mut rec, &rig, MfTone::Tone7);
    assert_eq!(chan.dnis(), "7");
    // collection over, straight to the category request
    assert_eq!(rig.mf_tx.tones_selected(), vec![MfTone::Tone5]);
}

// With ANI wanted up front (ITU default), the category request interrupts
// the DNIS after the first digit and the ANI is collected before the rest.
#[test]
fn itu_ani_first_collection_order() {
    let ctx = R2Context::new(Variant::Itu, 2, 2).unwrap();
    let rig = rig();
    let mut chan = rig.channel(&ctx);
    let mut rec = Recorder::new();
    rec.accept_on_offer = Some(CallMode::NoCharge);

    deliver_bits(&mut chan, &mut rec, &rig, 0x0);
    // first DNIS digit diverts to the category request (tone 5)
    peer_pulse(&mut chan, &mut rec, &rig, MfTone::Tone9);
    assert_eq!(rig.mf_tx.tones_selected(), vec![MfTone::Tone5]);
    // category, then two ANI digits against our tone-5 requests
    peer_pulse(&mut chan, &mut rec, &rig, MfTone::Tone2);
    peer_pulse(&mut chan, &mut rec, &rig, MfTone::Tone4);
    peer_pulse(&mut chan, &mut rec, &rig, MfTone::Tone4);
    assert_eq!(chan.ani(), "44");
    // ANI done, DNIS unfinished: back to next-DNIS requests
    peer_pulse(&mut chan, &mut rec, &rig, MfTone::Tone8);
    assert_eq!(chan.dnis(), "98");
    // DNIS now complete and ANI fetched: Group II next
    deliver_tone_on(&mut chan, &mut rec, &rig, MfTone::Tone2);
    assert!(rec.has(&Ev::Offered {
        ani: "44".to_owned(),
        dnis: "98".to_owned(),
        category: Category::NationalPrioritySubscriber,
    }));
}

// The far end says "no more ANI" with the restricted-ANI signal; the call
// still offers, with what was collected.
#[test]
fn restricted_ani_signal_marks_and_continues() {
    let ctx = R2Context::new(Variant::Argentina, 4, 1).unwrap();
    let rig = rig();
    let mut chan = rig.channel(&ctx);
    let mut rec = Recorder::new();

    deliver_bits(&mut chan, &mut rec, &rig, 0x0);
    // single DNIS digit completes collection; category comes next
    peer_pulse(&mut chan, &mut rec, &rig, MfTone::Tone2);
    peer_pulse(&mut chan, &mut rec, &rig, MfTone::Tone1);
    // restricted ANI (Argentina tone 12) ends the ANI phase
    peer_pulse(&mut chan, &mut rec, &rig, MfTone::Tone12);
    deliver_tone_on(&mut chan, &mut rec, &rig, MfTone::Tone1);
    assert!(rec.has(&Ev::Offered {
        ani: String::new(),
        dnis: "2".to_owned(),
        category: Category::NationalSubscriber,
    }));
}

// Mexico has no end-of-DNIS signal: the cycle times out, our request tone
// is pulsed and muted by timer, and collection moves on to the category.
#[test]
fn back_cycle_timeout_resumes_with_category() {
    let ctx = R2Context::new(Variant::Mexico, 2, 4).unwrap();
    let rig = rig();
    let mut chan = rig.channel(&ctx);
    let mut rec = Recorder::new();

    deliver_bits(&mut chan, &mut rec, &rig, 0x0);
    // one digit, we request the next (Mexico sends DNIS first)
    peer_pulse(&mut chan, &mut rec, &rig, MfTone::Tone1);
    assert_eq!(rig.mf_tx.tones_selected(), vec![MfTone::Tone1]);

    // the far end is out of digits and stays silent
    rig.advance(1501);
    chan.process_events(&mut rec);
    // category-and-change-to-GC went up (tone 6)
    assert_eq!(chan.tx_mf_tone(), Some(MfTone::Tone6));
    assert!(!rec.log.iter().any(|ev| matches!(ev, Ev::ProtocolError(_))));

    // the resume timer mutes it so the far end sees an off edge
    rig.advance(151);
    chan.process_events(&mut rec);
    assert_eq!(chan.tx_mf_tone(), None);

    // category arrives; ANI collection proceeds in Group C (tone 1)
    deliver_tone_on(&mut chan, &mut rec, &rig, MfTone::Tone2);
    assert_eq!(chan.tx_mf_tone(), Some(MfTone::Tone1));
}

// The same stall on a variant with an end-of-DNIS signal is an error.
#[test]
fn back_cycle_timeout_is_error_when_signal_exists() {
    let ctx = R2Context::new(Variant::Itu, 0, 2).unwrap();
    let rig = rig();
    let mut chan = rig.channel(&ctx);
    let mut rec = Recorder::new();

    deliver_bits(&mut chan, &mut rec, &rig, 0x0);
    peer_pulse(&mut chan, &mut rec, &rig, MfTone::Tone5);
    rig.advance(1501);
    chan.process_events(&mut rec);
    assert!(rec.has(&Ev::ProtocolError(ProtocolErrorReason::BackMfTimeout)));
    assert_eq!(rig.dev.last_tx_masked(0xC), Some(0x8));
}

// Tone verdicts shorter than the threshold are transient misdetections.
#[test]
fn threshold_debounces_short_verdicts() {
    let mut ctx = R2Context::new(Variant::Itu, 0, 2).unwrap();
    ctx.set_mf_threshold(Some(embedded_time::duration::Milliseconds(100)));
    let rig = rig();
    let mut chan = rig.channel(&ctx);
    let mut rec = Recorder::new();

    deliver_bits(&mut chan, &mut rec, &rig, 0x0);
    // fresh verdict: not yet stable, ignored
    deliver_tone_on(&mut chan, &mut rec, &rig, MfTone::Tone5);
    assert_eq!(chan.dnis(), "");
    assert_eq!(chan.rx_mf_tone(), None);
    // same verdict after the threshold: believed
    rig.advance(150);
    deliver_tone_on(&mut chan, &mut rec, &rig, MfTone::Tone5);
    assert_eq!(chan.dnis(), "5");
}

// An inbound seize while the MF engine cannot start must not ack.
#[test]
fn engine_failure_aborts_incoming_call() {
    let ctx = R2Context::new(Variant::Itu, 0, 2).unwrap();
    let rig = rig();
    let mut chan = rig.channel(&ctx);
    let mut rec = Recorder::new();
    rig.mf_tx.init_ok.set(false);

    deliver_bits(&mut chan, &mut rec, &rig, 0x0);
    assert!(rec.has(&Ev::ProtocolError(ProtocolErrorReason::InternalError)));
    assert!(!rec.has(&Ev::CallInit));
    // the line was reset to idle, never acked
    assert_eq!(rig.dev.tx_history_masked(0xC), vec![0x8]);
}
