// SPDX-FileCopyrightText: © 2025 CycleKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Test utilities for module testing without a topology.

use cyclekit_core::buffer::{Buffer, BufferOrigin};
use cyclekit_core::error::{CycleKitError, Result};
use cyclekit_core::media_format::MediaFormat;
use cyclekit_core::metadata::{
    insert_ordered, Metadata, MetadataHandler, MetadataList, MetadataSpec, PropagateOutcome,
    PropagateParams, TrackingRequest, TrackingStatus,
};
use cyclekit_core::module::{
    EventSink, InputStream, Module, ModuleEvent, OutputStream, ProcessContext,
};
use cyclekit_core::stream::StreamData;
use cyclekit_core::trigger_policy::TriggerType;
use std::sync::Arc;

/// Metadata handler that records what modules do with markers.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    pub created: usize,
    pub destroyed: Vec<(Metadata, TrackingStatus)>,
}

impl MetadataHandler for RecordingHandler {
    fn create(
        &mut self,
        list: &mut MetadataList,
        spec: MetadataSpec,
        buf_len: usize,
    ) -> Result<()> {
        if spec.offset > buf_len {
            return Err(CycleKitError::BadParam("offset past data".into()));
        }
        self.created += 1;
        let mut md = Metadata::new(spec.id, spec.offset, spec.flags);
        md.payload = spec.payload;
        insert_ordered(list, md);
        Ok(())
    }

    fn create_with_tracking(
        &mut self,
        list: &mut MetadataList,
        spec: MetadataSpec,
        buf_len: usize,
        _tracking: TrackingRequest,
    ) -> Result<()> {
        self.create(list, spec, buf_len)
    }

    fn clone_into(&mut self, md: &Metadata, dest: &mut MetadataList) -> Result<()> {
        self.created += 1;
        insert_ordered(dest, md.clone());
        Ok(())
    }

    fn destroy(&mut self, md: Metadata, status: TrackingStatus) {
        self.destroyed.push((md, status));
    }

    fn propagate(&mut self, _params: PropagateParams<'_>) -> Result<PropagateOutcome> {
        Err(CycleKitError::Unsupported("propagation is done by the engine".into()))
    }

    fn modify_at_data_flow_start(&mut self, _list: &mut MetadataList) {}
}

/// An input port holding `bytes` in every one of its `num_bufs` buffers.
pub fn input_with(bytes: &[u8], num_bufs: usize, format: Option<MediaFormat>) -> InputStream {
    let mut buf = Buffer::new(num_bufs, bytes.len(), BufferOrigin::Heap).ok();
    if let Some(buf) = buf.as_mut() {
        buf.push_bytes(bytes);
    }
    InputStream {
        data: StreamData { buf, ..StreamData::default() },
        format: format.map(Arc::new),
        consumed: 0,
        available: true,
    }
}

/// An output port with an empty buffer of `capacity` bytes per buffer.
pub fn output_with(capacity: usize, num_bufs: usize, format: Option<MediaFormat>) -> OutputStream {
    OutputStream {
        data: StreamData {
            buf: Buffer::new(num_bufs, capacity, BufferOrigin::Pool).ok(),
            ..StreamData::default()
        },
        format: format.map(Arc::new),
        available: true,
    }
}

/// An output port prepared for an in-place call: no buffer of its own.
pub fn in_place_output(format: Option<MediaFormat>) -> OutputStream {
    OutputStream { data: StreamData::default(), format: format.map(Arc::new), available: true }
}

/// Runs one `process` call and returns the events it raised.
///
/// # Errors
///
/// Whatever the module returns.
pub fn run_once(
    module: &mut dyn Module,
    inputs: &mut [InputStream],
    outputs: &mut [OutputStream],
) -> Result<Vec<ModuleEvent>> {
    let mut handler = RecordingHandler::default();
    run_with(module, inputs, outputs, &mut handler)
}

/// Like [`run_once`] with a caller-owned handler.
///
/// # Errors
///
/// Whatever the module returns.
pub fn run_with(
    module: &mut dyn Module,
    inputs: &mut [InputStream],
    outputs: &mut [OutputStream],
    handler: &mut RecordingHandler,
) -> Result<Vec<ModuleEvent>> {
    let mut events = EventSink::new();
    let mut ctx = ProcessContext {
        trigger: TriggerType::Data,
        inputs,
        outputs,
        metadata: handler,
        events: &mut events,
    };
    module.process(&mut ctx)?;
    Ok(events.drain().collect())
}

/// Valid bytes of output `index`, first buffer.
pub fn output_bytes(outputs: &[OutputStream], index: usize) -> Vec<u8> {
    outputs
        .get(index)
        .and_then(|o| o.data.buf.as_ref())
        .map(|b| b.channel(0).to_vec())
        .unwrap_or_default()
}

/// Little-endian bytes of a run of 16-bit samples.
pub fn samples(values: &[i16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}
