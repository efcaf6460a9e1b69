//! In-memory engine that records every call, for tests.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    engine::{EngineError, MuxEngine, OptionError, OutputContext},
    options::MuxOptions,
    packet::PendingPacket,
    track::CodecParams,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenPacket {
    pub stream_index: usize,
    pub pts: i64,
    pub dts: i64,
    pub duration: i64,
    pub position: i64,
    pub key: bool,
    pub data: Vec<u8>,
}

/// Everything the engine saw, shared between the engine, its contexts and the test.
#[derive(Debug, Default)]
pub struct Probe {
    pub opened: Vec<(String, String)>,
    pub options: Option<MuxOptions>,
    pub streams: Vec<CodecParams>,
    /// Extradata per stream as of the header write.
    pub header_extradata: Vec<(usize, Vec<u8>)>,
    pub headers: usize,
    pub packets: Vec<WrittenPacket>,
    pub trailers: usize,
    pub released: usize,

    pub fail_open: bool,
    pub reject_option: Option<String>,
    pub fail_header: bool,
    pub fail_packets: bool,
    pub fail_trailer: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingEngine {
    probe: Arc<Mutex<Probe>>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self) -> MutexGuard<'_, Probe> {
        self.probe.lock().unwrap()
    }
}

impl MuxEngine for RecordingEngine {
    type Context = RecordingOutput;

    fn open(&self, destination: &str, format: &str) -> Result<RecordingOutput, EngineError> {
        let mut probe = self.probe();
        if probe.fail_open || format.is_empty() {
            return Err(EngineError::new("Invalid argument"));
        }
        probe.opened.push((destination.to_string(), format.to_string()));
        Ok(RecordingOutput {
            probe: self.probe.clone(),
            extradata: Vec::new(),
            header_written: false,
        })
    }
}

pub struct RecordingOutput {
    probe: Arc<Mutex<Probe>>,
    extradata: Vec<(usize, Vec<u8>)>,
    header_written: bool,
}

impl RecordingOutput {
    fn probe(&self) -> MutexGuard<'_, Probe> {
        self.probe.lock().unwrap()
    }
}

impl OutputContext for RecordingOutput {
    fn apply_options(&mut self, options: &MuxOptions) -> Result<(), OptionError> {
        let mut probe = self.probe();
        if let Some(key) = probe.reject_option.clone() {
            if options.get(&key).is_some() {
                return Err(OptionError {
                    key,
                    reason: "Cannot allocate memory".to_string(),
                });
            }
        }
        probe.options = Some(options.clone());
        Ok(())
    }

    fn add_stream(&mut self, params: &CodecParams) -> Result<usize, EngineError> {
        let mut probe = self.probe();
        probe.streams.push(params.clone());
        Ok(probe.streams.len() - 1)
    }

    fn set_extradata(&mut self, stream_index: usize, data: &[u8]) -> Result<(), EngineError> {
        self.extradata.retain(|(index, _)| *index != stream_index);
        self.extradata.push((stream_index, data.to_vec()));
        Ok(())
    }

    fn write_header(&mut self) -> Result<(), EngineError> {
        let mut probe = self.probe();
        if probe.fail_header {
            return Err(EngineError::new("Invalid data found when processing input"));
        }
        probe.headers += 1;
        probe.header_extradata = self.extradata.clone();
        drop(probe);
        self.header_written = true;
        Ok(())
    }

    fn write_packet(&mut self, packet: &PendingPacket, data: &[u8]) -> Result<(), EngineError> {
        let mut probe = self.probe();
        if !self.header_written {
            return Err(EngineError::new("header not written"));
        }
        if probe.fail_packets {
            return Err(EngineError::new("Broken pipe"));
        }
        probe.packets.push(WrittenPacket {
            stream_index: packet.stream_index(),
            pts: packet.pts(),
            dts: packet.dts(),
            duration: packet.duration(),
            position: packet.position(),
            key: packet.is_key(),
            data: data.to_vec(),
        });
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<(), EngineError> {
        let mut probe = self.probe();
        probe.trailers += 1;
        if probe.fail_trailer {
            return Err(EngineError::new("Connection reset by peer"));
        }
        Ok(())
    }
}

impl Drop for RecordingOutput {
    fn drop(&mut self) {
        if let Ok(mut probe) = self.probe.lock() {
            probe.released += 1;
        }
    }
}
