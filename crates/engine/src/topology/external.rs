// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Host-facing side of unconnected ports.

use super::Topology;
use crate::host::ContainerCallbacks;
use crate::ids::PortId;
use bytes::Bytes;
use cyclekit_core::error::{CycleKitError, Result};
use cyclekit_core::metadata::{
    Metadata, MetadataFlags, MetadataHandler, MetadataId, MetadataList, MetadataSpec,
    TrackingRequest, TrackingStatus,
};
use cyclekit_core::state::DataFlowState;
use cyclekit_core::stream::StreamFlags;

/// Data collected from an external output.
#[derive(Debug, Clone, Default)]
pub struct ExternalOutput {
    /// One entry per channel buffer.
    pub channels: Vec<Bytes>,
    /// Markers that left the graph. Their cargo has been given back; tracked
    /// ones must be handed to [`Topology::destroy_metadata`] once the host
    /// is done with them.
    pub metadata: MetadataList,
    pub flags: StreamFlags,
    pub timestamp: i64,
}

impl ExternalOutput {
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Bytes::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0 && self.metadata.is_empty()
    }
}

impl<H: ContainerCallbacks> Topology<H> {
    /// Copies host data into an external input. Returns the bytes written per
    /// channel; whatever doesn't fit below the port threshold is dropped and
    /// reported.
    ///
    /// # Errors
    ///
    /// `BadParam` for a connected port, a port without a media format, or a
    /// channel count that doesn't match the format. `NoMemory` when no
    /// buffer can be obtained.
    pub fn write_external_input(
        &mut self,
        port: PortId,
        channels: &[&[u8]],
        end_of_frame: bool,
    ) -> Result<usize> {
        let input = self.graph.input(port)?;
        if !input.is_external() {
            return Err(CycleKitError::BadParam(format!("{port} is connected")));
        }
        if input.common.effective.drops_data() {
            tracing::trace!(%port, "Write to stopped input ignored");
            return Ok(0);
        }
        let num_bufs = input
            .common
            .format
            .as_ref()
            .and_then(|h| self.svc.formats.get(h))
            .map(cyclekit_core::media_format::MediaFormat::num_bufs)
            .ok_or_else(|| CycleKitError::BadParam(format!("{port} has no media format")))?;
        if channels.len() != num_bufs {
            return Err(CycleKitError::BadParam(format!(
                "{port} expects {num_bufs} channel buffers, got {}",
                channels.len()
            )));
        }
        let threshold = input.common.threshold;
        let at_gap = !input.common.flow.is_flowing();

        let input = self.graph.input_mut(port)?;
        let mut data = std::mem::take(&mut input.data);
        let buf = match data.buf.take() {
            Some(buf) => buf,
            None => match self.svc.pool.acquire(num_bufs, threshold, self.svc.gate.is_active()) {
                Ok(buf) => buf,
                Err(e) => {
                    self.graph.input_mut(port)?.data = data;
                    return Err(e);
                },
            },
        };
        let mut buf = buf;

        let mut md = self.svc.md();
        if at_gap {
            md.modify_at_data_flow_start(&mut data.metadata);
        }
        if !data.metadata.is_empty() {
            md.modify_md_when_new_data_arrives(&mut data.metadata);
        }

        let offered = channels.iter().map(|c| c.len()).min().unwrap_or(0);
        let written = buf.push_channels(channels);
        if written < offered {
            self.svc.diag.write_overflow(&mut self.svc.host, &port, offered - written);
        }
        data.buf = Some(buf);
        data.flags.end_of_frame |= end_of_frame;
        data.refresh_marker_eos();

        let input = self.graph.input_mut(port)?;
        input.data = data;
        if written > 0 {
            input.common.flow = DataFlowState::Flowing;
        }
        Ok(written)
    }

    /// Ends the stream on an external input at the end of the data written
    /// so far. Returns the end-of-stream sequence number; a flushing one stays
    /// listed in [`Topology::pending_eos`] until its last copy is gone.
    ///
    /// # Errors
    ///
    /// `BadParam` for a connected port, `NoMemory` when the marker can't be
    /// allocated.
    pub fn push_external_eos(
        &mut self,
        port: PortId,
        flushing: bool,
        tracking: Option<TrackingRequest>,
    ) -> Result<u32> {
        let input = self.graph.input_mut(port)?;
        if !input.is_external() {
            return Err(CycleKitError::BadParam(format!("{port} is connected")));
        }
        let mut data = std::mem::take(&mut input.data);
        let offset = data.actual_len();
        let created =
            self.svc.md().create_eos(&mut data.metadata, offset, flushing, Some(port), tracking);
        data.flags.end_of_frame = true;
        data.refresh_marker_eos();

        let input = self.graph.input_mut(port)?;
        input.data = data;
        let origin_id = created?;
        if flushing {
            input.pending_eos.push(origin_id);
        }
        Ok(origin_id)
    }

    /// Marks a pause in the host's data at the end of what was written.
    ///
    /// # Errors
    ///
    /// `BadParam` for a connected port, `NoMemory` from the low-power gate.
    pub fn push_data_flow_gap(&mut self, port: PortId) -> Result<()> {
        let input = self.graph.input_mut(port)?;
        if !input.is_external() {
            return Err(CycleKitError::BadParam(format!("{port} is connected")));
        }
        let mut data = std::mem::take(&mut input.data);
        let offset = data.actual_len();
        let spec =
            MetadataSpec::new(MetadataId::DataFlowGap, offset, MetadataFlags::buffer().internal());
        let created = self.svc.md().create(&mut data.metadata, spec, offset);
        data.flags.end_of_frame = true;
        self.graph.input_mut(port)?.data = data;
        created
    }

    /// Takes everything an external output collected.
    ///
    /// # Errors
    ///
    /// `BadParam` for a connected port.
    pub fn take_external_output(&mut self, port: PortId) -> Result<ExternalOutput> {
        let output = self.graph.output_mut(port)?;
        if !output.is_external() {
            return Err(CycleKitError::BadParam(format!("{port} is connected")));
        }
        let mut data = std::mem::take(&mut output.data);
        let mut out = ExternalOutput {
            channels: Vec::new(),
            metadata: std::mem::take(&mut data.metadata),
            flags: data.flags,
            timestamp: data.timestamp,
        };
        if let Some(buf) = data.buf.take() {
            out.channels =
                (0..buf.num_bufs()).map(|ch| Bytes::copy_from_slice(buf.channel(ch))).collect();
            self.svc.pool.release(buf);
        }

        let mut md = self.svc.md();
        for marker in &mut out.metadata {
            md.detach_at_boundary(marker);
        }
        self.apply_cleared_origins();
        if !out.is_empty() {
            tracing::trace!(%port, bytes = out.len(), markers = out.metadata.len(), "External output drained");
        }
        Ok(out)
    }

    /// Reports the outcome of a marker the host received from an external
    /// output.
    pub fn destroy_metadata(&mut self, md: Metadata, status: TrackingStatus) {
        self.svc.md().destroy(md, status);
        self.apply_cleared_origins();
    }

    /// Flushing end-of-stream sequence numbers issued on `port` whose
    /// copies are still inside the graph.
    ///
    /// # Errors
    ///
    /// `NotFound` or `BadParam` for an unknown input.
    pub fn pending_eos(&self, port: PortId) -> Result<&[u32]> {
        Ok(&self.graph.input(port)?.pending_eos)
    }
}

#[cfg(test)]
mod tests {
    use crate::host::NullHost;
    use crate::ids::PortId;
    use crate::topology::Topology;
    use cyclekit_core::config::EngineConfig;
    use cyclekit_core::error::CycleKitError;
    use cyclekit_core::media_format::{MediaFormat, PcmFormat};
    use cyclekit_core::module::{Module, ModuleInfo, ModuleKind, ProcessContext};

    struct Sink;

    impl Module for Sink {
        fn info(&self) -> ModuleInfo {
            ModuleInfo::new(ModuleKind::Generic, 1, 0)
        }

        fn process(&mut self, ctx: &mut ProcessContext<'_>) -> cyclekit_core::error::Result<()> {
            for input in ctx.inputs.iter_mut() {
                input.consumed = input.data.actual_len();
            }
            Ok(())
        }
    }

    fn topology() -> (Topology<NullHost>, PortId) {
        let mut topo = Topology::new(EngineConfig::default(), NullHost)
            .unwrap_or_else(|e| panic!("{e}"));
        let sg = topo.add_subgraph();
        let id = topo.add_module(sg, "sink", Box::new(Sink)).unwrap_or_else(|e| panic!("{e}"));
        topo.start_subgraph(sg).unwrap_or_else(|e| panic!("{e}"));
        let port = PortId::input(id, 0);
        topo.set_port_threshold(port, 8).unwrap_or_else(|e| panic!("{e}"));
        (topo, port)
    }

    #[test]
    fn write_requires_format_and_matching_channels() {
        let (mut topo, port) = topology();
        let err = topo.write_external_input(port, &[&[1, 2]], false);
        assert!(matches!(err, Err(CycleKitError::BadParam(_))));

        let stereo = MediaFormat::Pcm(PcmFormat::deinterleaved(48_000, 2, 16));
        topo.set_external_input_media_format(port, &stereo).unwrap_or_else(|e| panic!("{e}"));
        let err = topo.write_external_input(port, &[&[1, 2]], false);
        assert!(matches!(err, Err(CycleKitError::BadParam(_))));

        let written = topo
            .write_external_input(port, &[&[1, 2], &[3, 4]], false)
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(written, 2);
    }

    #[test]
    fn overflow_is_truncated_and_counted() {
        let (mut topo, port) = topology();
        let mono = MediaFormat::pcm(48_000, 1, 16);
        topo.set_external_input_media_format(port, &mono).unwrap_or_else(|e| panic!("{e}"));
        let written =
            topo.write_external_input(port, &[&[7; 12]], false).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(written, 8);
        assert_eq!(topo.diagnostics().overflowed_bytes, 4);
    }

    #[test]
    fn flushing_eos_is_pending_until_consumed() {
        let (mut topo, port) = topology();
        let mono = MediaFormat::pcm(48_000, 1, 16);
        topo.set_external_input_media_format(port, &mono).unwrap_or_else(|e| panic!("{e}"));
        topo.write_external_input(port, &[&[1; 4]], false).unwrap_or_else(|e| panic!("{e}"));
        let id = topo.push_external_eos(port, true, None).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(topo.pending_eos(port).unwrap_or_else(|e| panic!("{e}")), &[id]);
        assert!(topo.input_stream(port).is_some_and(|d| d.flags.marker_eos));
    }
}
