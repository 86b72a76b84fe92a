// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Marker propagation across one module invocation.
//!
//! For a single input/output pair, given bytes consumed and produced:
//!
//! 1. Held markers (already past the input, waiting for output) move to the
//!    output when enough output was produced to cover them. Otherwise their
//!    offset shrinks by `produced`.
//! 2. Input markers that were crossed by consumption are translated into the
//!    output domain (rate conversion, plus algorithmic delay for
//!    sample-associated markers) and then treated like held markers. Markers
//!    not crossed stay with `offset - consumed`.
//!
//! FIFO order is preserved: once a marker has to wait, every marker behind it
//! waits as well.

use cyclekit_core::error::{CycleKitError, Result};
use cyclekit_core::media_format::MediaFormat;
use cyclekit_core::metadata::{insert_ordered, Metadata, PropagateOutcome, PropagateParams};

/// Subtracts `consumed` from a marker offset, clamping at zero.
/// Returns the new offset and whether the subtraction underflowed.
pub const fn sub_offset(offset: usize, consumed: usize) -> (usize, bool) {
    match offset.checked_sub(consumed) {
        Some(v) => (v, false),
        None => (0, true),
    }
}

/// Whether consuming `consumed` of `input_len` bytes carries a marker at `offset` past the input.
pub const fn is_crossed(offset: usize, consumed: usize, input_len: usize) -> bool {
    offset < consumed || (offset == consumed && consumed == input_len)
}

fn to_output_domain(
    md: &Metadata,
    in_format: Option<&MediaFormat>,
    out_format: Option<&MediaFormat>,
    delay_bytes: usize,
) -> usize {
    let converted = match (in_format, out_format) {
        (Some(from), Some(to)) => from.convert_bytes_to(to, md.offset),
        _ => md.offset,
    };
    // Flushing end-of-stream is exempt: zero padding accounts for the delay.
    if md.flags.sample_associated && !md.is_flushing_eos() {
        converted + delay_bytes
    } else {
        converted
    }
}

struct Mover<'a> {
    output: &'a mut Vec<Metadata>,
    held: Vec<Metadata>,
    out_initial: usize,
    produced: usize,
    squeeze: bool,
    blocked: bool,
    outcome: PropagateOutcome,
}

impl Mover<'_> {
    /// `pending` is the number of output bytes (from the start of this call's
    /// output) that must exist before the marker may leave.
    fn offer(&mut self, mut md: Metadata, pending: usize) {
        let squeezed = self.squeeze && md.is_flushing_eos();
        let ready = if squeezed { self.produced == 0 } else { pending <= self.produced };
        if !self.blocked && ready {
            md.offset = self.out_initial + pending.min(self.produced);
            if md.is_flushing_eos() {
                self.outcome.flushing_eos_out = true;
            }
            self.outcome.moved += 1;
            insert_ordered(self.output, md);
        } else {
            self.blocked = true;
            md.offset = pending.saturating_sub(self.produced);
            self.held.push(md);
        }
    }
}

/// Runs one propagation step. Returns the outcome and the number of offset
/// underflows that were clamped.
///
/// # Errors
///
/// `BadParam` if more bytes were consumed than were present.
pub fn propagate_markers(p: PropagateParams<'_>) -> Result<(PropagateOutcome, usize)> {
    if p.consumed > p.input_len {
        return Err(CycleKitError::BadParam(format!(
            "consumed {} bytes of a {}-byte input",
            p.consumed, p.input_len
        )));
    }

    let delay_bytes = p.out_format.map_or(0, |f| f.us_to_bytes(p.algo_delay_us));
    let mut mover = Mover {
        output: p.output,
        held: Vec::new(),
        out_initial: p.out_initial,
        produced: p.produced,
        squeeze: p.squeeze,
        blocked: false,
        outcome: PropagateOutcome::default(),
    };

    for md in std::mem::take(p.held) {
        let pending = md.offset;
        mover.offer(md, pending);
    }

    let mut underflows = 0;
    let mut input_blocked = false;
    let mut remaining = Vec::with_capacity(p.input.len());
    for mut md in std::mem::take(p.input) {
        let crossed = is_crossed(md.offset, p.consumed, p.input_len);
        let pinned = p.hold_flushing_eos && md.is_flushing_eos();
        if crossed && !pinned && !input_blocked {
            let pending = to_output_domain(&md, p.in_format, p.out_format, delay_bytes);
            // Squeezed end-of-stream always waits at least one more call.
            if mover.squeeze && md.is_flushing_eos() {
                mover.blocked = true;
                md.offset = pending.saturating_sub(mover.produced);
                mover.held.push(md);
            } else {
                mover.offer(md, pending);
            }
        } else {
            input_blocked = true;
            let (offset, underflow) = sub_offset(md.offset, p.consumed);
            if underflow {
                underflows += 1;
            }
            md.offset = offset;
            remaining.push(md);
        }
    }
    *p.input = remaining;

    let mut outcome = mover.outcome;
    outcome.flushing_eos_held = mover.held.iter().any(Metadata::is_flushing_eos);
    *p.held = mover.held;
    Ok((outcome, underflows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyclekit_core::metadata::{MetadataFlags, MetadataId, MetadataList};

    fn md(id: MetadataId, offset: usize, flags: MetadataFlags) -> Metadata {
        Metadata::new(id, offset, flags)
    }

    struct Lists {
        input: MetadataList,
        held: MetadataList,
        output: MetadataList,
    }

    impl Lists {
        fn new(input: MetadataList) -> Self {
            Self { input, held: Vec::new(), output: Vec::new() }
        }

        #[allow(clippy::too_many_arguments)]
        fn run(
            &mut self,
            input_len: usize,
            consumed: usize,
            out_initial: usize,
            produced: usize,
            fmt: Option<(&MediaFormat, &MediaFormat)>,
            delay_us: u64,
            squeeze: bool,
        ) -> PropagateOutcome {
            let (outcome, _) = propagate_markers(PropagateParams {
                input: &mut self.input,
                held: &mut self.held,
                output: &mut self.output,
                in_format: fmt.map(|f| f.0),
                out_format: fmt.map(|f| f.1),
                input_len,
                consumed,
                out_initial,
                produced,
                algo_delay_us: delay_us,
                squeeze,
                hold_flushing_eos: false,
            })
            .unwrap_or_else(|e| panic!("{e}"));
            outcome
        }
    }

    #[test]
    fn uncrossed_marker_stays_with_reduced_offset() {
        let mut l = Lists::new(vec![md(MetadataId::Custom(1), 150, MetadataFlags::sample())]);
        let outcome = l.run(200, 100, 0, 100, None, 0, false);
        assert_eq!(outcome.moved, 0);
        assert_eq!(l.input[0].offset, 50);
        assert!(l.output.is_empty());
    }

    #[test]
    fn crossed_marker_rebased_onto_output() {
        let mut l = Lists::new(vec![md(MetadataId::Custom(1), 40, MetadataFlags::sample())]);
        let outcome = l.run(100, 100, 30, 100, None, 0, false);
        assert_eq!(outcome.moved, 1);
        assert_eq!(l.output[0].offset, 70);
        assert!(l.input.is_empty());
    }

    #[test]
    fn flushing_eos_ignores_delay_while_others_get_it() {
        let fmt = MediaFormat::pcm(48_000, 1, 16);
        // 20 samples of delay = 40 bytes
        let delay_us = 20 * 1_000_000 / 48_000 + 1;
        let mut l = Lists::new(vec![
            md(MetadataId::Custom(9), 10, MetadataFlags::sample()),
            md(MetadataId::Eos, 50, MetadataFlags::sample().flushing(true)),
        ]);
        let outcome = l.run(200, 200, 0, 200, Some((&fmt, &fmt)), delay_us, false);
        assert_eq!(outcome.moved, 2);
        assert!(outcome.flushing_eos_out);
        assert_eq!(l.output[0].offset, 50);
        assert_eq!(l.output[0].id, MetadataId::Custom(9));
        assert_eq!(l.output[1].offset, 50);
        assert!(l.output[1].is_flushing_eos());
    }

    #[test]
    fn marker_waits_for_delayed_output() {
        let mut l = Lists::new(vec![md(MetadataId::Custom(1), 90, MetadataFlags::sample())]);
        // Module consumed everything but only produced 60 bytes so far.
        l.run(100, 100, 0, 60, None, 0, false);
        assert!(l.output.is_empty());
        assert_eq!(l.held[0].offset, 30);
        // Next call produces 40 more bytes on top of 10 already waiting.
        l.run(0, 0, 10, 40, None, 0, false);
        assert!(l.held.is_empty());
        assert_eq!(l.output[0].offset, 40);
    }

    #[test]
    fn rate_conversion_scales_offset() {
        let hi = MediaFormat::pcm(48_000, 1, 16);
        let lo = MediaFormat::pcm(16_000, 1, 16);
        let mut l = Lists::new(vec![md(MetadataId::Custom(1), 96, MetadataFlags::sample())]);
        l.run(192, 192, 0, 64, Some((&hi, &lo)), 0, false);
        assert_eq!(l.output[0].offset, 32);
    }

    #[test]
    fn squeeze_holds_flushing_eos_until_output_stops() {
        let mut l = Lists::new(vec![md(
            MetadataId::Eos,
            100,
            MetadataFlags::sample().flushing(true),
        )]);
        let outcome = l.run(100, 100, 0, 80, None, 0, true);
        assert!(outcome.flushing_eos_held);
        assert!(l.output.is_empty());

        // Tail of the codec state.
        let outcome = l.run(0, 0, 80, 20, None, 0, true);
        assert!(outcome.flushing_eos_held);

        // Nothing more produced: the marker goes out at the end of the output.
        let outcome = l.run(0, 0, 100, 0, None, 0, true);
        assert!(outcome.flushing_eos_out);
        assert!(!outcome.flushing_eos_held);
        assert_eq!(l.output[0].offset, 100);
    }

    #[test]
    fn waiting_marker_blocks_markers_behind_it() {
        let mut l = Lists::new(vec![
            md(MetadataId::Eos, 10, MetadataFlags::sample().flushing(true)),
            md(MetadataId::Custom(2), 10, MetadataFlags::buffer()),
        ]);
        l.run(10, 10, 0, 10, None, 0, true);
        assert!(l.output.is_empty());
        assert_eq!(l.held.len(), 2);
        assert_eq!(l.held[0].id, MetadataId::Eos);
    }

    #[test]
    fn over_consumption_is_rejected() {
        let mut input = MetadataList::new();
        let mut held = MetadataList::new();
        let mut output = MetadataList::new();
        let res = propagate_markers(PropagateParams {
            input: &mut input,
            held: &mut held,
            output: &mut output,
            in_format: None,
            out_format: None,
            input_len: 10,
            consumed: 11,
            out_initial: 0,
            produced: 0,
            algo_delay_us: 0,
            squeeze: false,
            hold_flushing_eos: false,
        });
        assert!(res.is_err());
    }

    #[test]
    fn offset_law_holds_for_mixed_lists() {
        // Either stays with offset - consumed, or moves to out_initial + x <= output len.
        for consumed in [0usize, 30, 60, 100] {
            for produced in [0usize, 25, 100] {
                let mut l = Lists::new(vec![
                    md(MetadataId::Custom(1), 0, MetadataFlags::sample()),
                    md(MetadataId::Custom(2), 30, MetadataFlags::buffer()),
                    md(MetadataId::Custom(3), 60, MetadataFlags::sample()),
                    md(MetadataId::Custom(4), 100, MetadataFlags::sample()),
                ]);
                let originals: Vec<_> = l.input.iter().map(|m| (m.id, m.offset)).collect();
                let out_initial = 7;
                l.run(100, consumed, out_initial, produced, None, 0, false);
                for (id, offset) in originals {
                    let in_input = l.input.iter().find(|m| m.id == id);
                    let in_output = l.output.iter().find(|m| m.id == id);
                    let in_held = l.held.iter().find(|m| m.id == id);
                    let places = [in_input, in_output, in_held].iter().filter(|p| p.is_some()).count();
                    assert_eq!(places, 1, "marker {id:?} must live in exactly one list");
                    if let Some(m) = in_input {
                        assert_eq!(m.offset, offset - consumed);
                    }
                    if let Some(m) = in_output {
                        assert_eq!(m.offset, out_initial + offset);
                        assert!(m.offset <= out_initial + produced);
                    }
                }
            }
        }
    }
}
