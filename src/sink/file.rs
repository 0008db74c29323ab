//! WAV file recorder.

use std::cell::{Cell, RefCell};
use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::format::f32_slice_to_i16;
use crate::sink::{AudioSink, SinkPort};
use crate::AudioError;

// WAV file format constants
// See: http://soundfile.sapp.org/doc/WaveFormat/

/// Byte offset of the file size field in WAV header (RIFF chunk size).
const WAV_FILE_SIZE_OFFSET: u64 = 4;

/// Byte offset of the data chunk size field in WAV header.
const WAV_DATA_SIZE_OFFSET: u64 = 40;

/// Size of the WAV header in bytes (RIFF + fmt + data chunk headers).
const WAV_HEADER_SIZE: usize = 44;

/// Size of the fmt chunk data (16 bytes for PCM).
const WAV_FMT_CHUNK_SIZE: u32 = 16;

/// Audio format code for PCM (uncompressed).
const WAV_FORMAT_PCM: u16 = 1;

/// Bits per sample for 16-bit audio.
const WAV_BITS_PER_SAMPLE: u16 = 16;

/// Bytes per sample (16-bit = 2 bytes).
const BYTES_PER_SAMPLE: u64 = 2;

/// Most samples a recording can hold before the RIFF size field overflows.
const MAX_SAMPLES: u64 = (u32::MAX as u64 - (WAV_HEADER_SIZE as u64 - 8)) / BYTES_PER_SAMPLE;

/// Size of the data chunk holding `samples`, if it fits the header.
fn data_chunk_size(samples: u64) -> Option<u32> {
    if samples > MAX_SAMPLES {
        return None;
    }
    u32::try_from(samples * BYTES_PER_SAMPLE).ok()
}

/// A sink that records mono 16-bit PCM to a WAV file.
///
/// The file is created on the first write. The header is brought up to date
/// on every flush and on [`close`](WavFileSink::close), so a recording is
/// readable after each completed flush. Disk writes are synchronous: the
/// recorder always accepts every sample and completes flushes immediately.
///
/// I/O errors cannot travel through the flow-control contract. They are
/// logged, the recording stops, and [`close`](WavFileSink::close) reports
/// the first one.
///
/// # Example
///
/// ```no_run
/// use audio_pipe::{AudioSource, MockSource, WavFileSink};
///
/// let recorder = WavFileSink::new("recording.wav", 8000);
/// let mock = MockSource::new(8000);
/// mock.register_sink(recorder.clone());
/// mock.generate_sine(1000.0, 500);
/// mock.pump();
/// recorder.close()?;
/// # Ok::<(), audio_pipe::AudioError>(())
/// ```
#[derive(Debug)]
pub struct WavFileSink {
    port: SinkPort,
    path: PathBuf,
    sample_rate: u32,
    writer: RefCell<Option<BufWriter<File>>>,
    samples_written: Cell<u64>,
    error: RefCell<Option<AudioError>>,
}

impl WavFileSink {
    /// Creates a recorder for `path`. Nothing is written until the first
    /// samples arrive.
    pub fn new(path: impl AsRef<Path>, sample_rate: u32) -> Rc<Self> {
        let path = path.as_ref().to_path_buf();
        Rc::new_cyclic(|me| Self {
            port: SinkPort::new(me.clone()),
            path,
            sample_rate,
            writer: RefCell::new(None),
            samples_written: Cell::new(0),
            error: RefCell::new(None),
        })
    }

    /// Path of the recording.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of samples recorded so far.
    pub fn samples_written(&self) -> u64 {
        self.samples_written.get()
    }

    /// Finalizes the header and closes the file.
    ///
    /// Returns the first I/O error seen during the recording, if any. Closing
    /// a recorder that never received samples creates no file.
    pub fn close(&self) -> Result<(), AudioError> {
        let finalized = self.finalize();
        self.writer.borrow_mut().take();
        if let Some(err) = self.error.borrow_mut().take() {
            return Err(err);
        }
        finalized
    }

    /// Writes a complete WAV header with the given parameters.
    ///
    /// The header includes RIFF, fmt, and data chunk headers (44 bytes total).
    fn write_wav_header(
        writer: &mut BufWriter<File>,
        sample_rate: u32,
        data_size: u32,
    ) -> std::io::Result<()> {
        let channels: u16 = 1;

        // RIFF container header
        writer.write_all(b"RIFF")?;
        let file_size = WAV_HEADER_SIZE as u32 - 8 + data_size;
        writer.write_all(&file_size.to_le_bytes())?;
        writer.write_all(b"WAVE")?;

        // fmt subchunk (format specification)
        writer.write_all(b"fmt ")?;
        writer.write_all(&WAV_FMT_CHUNK_SIZE.to_le_bytes())?;
        writer.write_all(&WAV_FORMAT_PCM.to_le_bytes())?;
        writer.write_all(&channels.to_le_bytes())?;
        writer.write_all(&sample_rate.to_le_bytes())?;

        let bytes_per_sample = WAV_BITS_PER_SAMPLE / 8;
        let byte_rate = sample_rate * u32::from(channels) * u32::from(bytes_per_sample);
        writer.write_all(&byte_rate.to_le_bytes())?;

        let block_align = channels * bytes_per_sample;
        writer.write_all(&block_align.to_le_bytes())?;
        writer.write_all(&WAV_BITS_PER_SAMPLE.to_le_bytes())?;

        // data subchunk header
        writer.write_all(b"data")?;
        writer.write_all(&data_size.to_le_bytes())?;

        Ok(())
    }

    /// Rewrites the size fields and leaves the cursor at the end.
    fn update_wav_header(writer: &mut BufWriter<File>, data_size: u32) -> std::io::Result<()> {
        let file_size = WAV_HEADER_SIZE as u32 - 8 + data_size;
        writer.seek(SeekFrom::Start(WAV_FILE_SIZE_OFFSET))?;
        writer.write_all(&file_size.to_le_bytes())?;

        writer.seek(SeekFrom::Start(WAV_DATA_SIZE_OFFSET))?;
        writer.write_all(&data_size.to_le_bytes())?;

        writer.seek(SeekFrom::End(0))?;
        writer.flush()
    }

    fn append(&self, samples: &[f32]) -> Result<(), AudioError> {
        let total = self.samples_written.get() + samples.len() as u64;
        if data_chunk_size(total).is_none() {
            // Leave a readable file holding everything up to the limit
            self.finalize()?;
            return Err(AudioError::file_error(
                &self.path,
                io::Error::other("recording exceeds the WAV size limit"),
            ));
        }

        let mut writer = self.writer.borrow_mut();
        if writer.is_none() {
            let file =
                File::create(&self.path).map_err(|e| AudioError::file_error(&self.path, e))?;
            let mut new_writer = BufWriter::new(file);

            // Placeholder header, sizes are patched on flush and close
            Self::write_wav_header(&mut new_writer, self.sample_rate, 0)
                .map_err(|e| AudioError::file_error(&self.path, e))?;
            tracing::debug!(path = %self.path.display(), "recording started");
            *writer = Some(new_writer);
        }

        if let Some(writer) = writer.as_mut() {
            let pcm: Vec<u8> = f32_slice_to_i16(samples)
                .into_iter()
                .flat_map(i16::to_le_bytes)
                .collect();
            writer
                .write_all(&pcm)
                .map_err(|e| AudioError::file_error(&self.path, e))?;
            self.samples_written
                .set(self.samples_written.get() + samples.len() as u64);
        }
        Ok(())
    }

    fn finalize(&self) -> Result<(), AudioError> {
        let mut writer = self.writer.borrow_mut();
        let Some(writer) = writer.as_mut() else {
            return Ok(());
        };
        let data_size = data_chunk_size(self.samples_written.get()).ok_or_else(|| {
            AudioError::file_error(
                &self.path,
                io::Error::other("recording exceeds the WAV size limit"),
            )
        })?;
        Self::update_wav_header(writer, data_size).map_err(|e| AudioError::file_error(&self.path, e))
    }

    fn record_error(&self, err: AudioError) {
        tracing::warn!(error = %err, "recording stopped");
        self.writer.borrow_mut().take();
        let mut slot = self.error.borrow_mut();
        if slot.is_none() {
            *slot = Some(err);
        }
    }
}

impl AudioSink for WavFileSink {
    fn sink_port(&self) -> &SinkPort {
        &self.port
    }

    fn write_samples(&self, samples: &[f32]) -> usize {
        tracing::trace!(samples = samples.len(), "recording block");
        if self.error.borrow().is_none() {
            if let Err(err) = self.append(samples) {
                self.record_error(err);
            }
        }
        samples.len()
    }

    fn flush_samples(&self) {
        if let Err(err) = self.finalize() {
            self.record_error(err);
        }
        self.port.source_all_samples_flushed();
    }
}

impl Drop for WavFileSink {
    fn drop(&mut self) {
        if let Err(err) = self.finalize() {
            tracing::warn!(error = %err, "failed to finalize recording");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{AudioSource, MockSource};
    use tempfile::tempdir;

    #[test]
    fn test_file_sink_creates_wav() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wav");

        let sink = WavFileSink::new(&path, 8000);
        sink.write_samples(&[0.1, 0.2, 0.3, 0.4]);
        sink.close().unwrap();

        let data = std::fs::read(&path).unwrap();
        assert_eq!(&data[0..4], b"RIFF");
        assert_eq!(&data[8..12], b"WAVE");
        assert_eq!(&data[12..16], b"fmt ");

        // Channels at offset 22, sample rate at offset 24
        assert_eq!(u16::from_le_bytes([data[22], data[23]]), 1);
        assert_eq!(
            u32::from_le_bytes([data[24], data[25], data[26], data[27]]),
            8000
        );
    }

    #[test]
    fn test_file_sink_writes_samples() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wav");

        let sink = WavFileSink::new(&path, 8000);
        sink.write_samples(&[0.5, -0.5]);
        sink.close().unwrap();

        let data = std::fs::read(&path).unwrap();
        let first = i16::from_le_bytes([data[WAV_HEADER_SIZE], data[WAV_HEADER_SIZE + 1]]);
        let second = i16::from_le_bytes([data[WAV_HEADER_SIZE + 2], data[WAV_HEADER_SIZE + 3]]);
        assert_eq!(first, 16383);
        assert_eq!(second, -16383);
    }

    #[test]
    fn test_flush_updates_header_and_completes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flush.wav");

        let sink = WavFileSink::new(&path, 8000);
        let mock = MockSource::new(8000);
        mock.register_sink(sink.clone());
        mock.add_samples(&[0.0; 6]);
        mock.flush();
        mock.pump();
        assert_eq!(mock.flushes_completed(), 1);

        // Data size is at offset 40 (little-endian u32)
        let data = std::fs::read(&path).unwrap();
        let data_size = u32::from_le_bytes([data[40], data[41], data[42], data[43]]);
        assert_eq!(data_size, 12);
        let file_size = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        assert_eq!(file_size, WAV_HEADER_SIZE as u32 - 8 + 12);
    }

    #[test]
    fn test_file_sink_invalid_path_error() {
        let sink = WavFileSink::new("/nonexistent/directory/test.wav", 8000);

        // Samples are still accepted so upstream never stalls
        assert_eq!(sink.write_samples(&[0.1, 0.2]), 2);

        let err = sink.close().unwrap_err();
        assert!(err.to_string().contains("nonexistent"));
    }

    #[test]
    fn test_data_chunk_size_limit() {
        assert_eq!(data_chunk_size(0), Some(0));
        assert_eq!(data_chunk_size(6), Some(12));
        let largest = data_chunk_size(MAX_SAMPLES).unwrap();
        assert!(largest.checked_add(WAV_HEADER_SIZE as u32 - 8).is_some());
        assert_eq!(data_chunk_size(MAX_SAMPLES + 1), None);
        assert_eq!(data_chunk_size(u64::MAX / BYTES_PER_SAMPLE), None);
    }

    #[test]
    fn test_recording_stops_at_size_limit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("full.wav");

        let sink = WavFileSink::new(&path, 8000);
        sink.write_samples(&[0.1; 4]);
        sink.samples_written.set(MAX_SAMPLES - 1);

        assert_eq!(sink.write_samples(&[0.1, 0.2]), 2);
        assert!(sink.writer.borrow().is_none());

        let err = sink.close().unwrap_err();
        assert!(err.to_string().contains("WAV size limit"));

        let data = std::fs::read(&path).unwrap();
        let data_size = u32::from_le_bytes([data[40], data[41], data[42], data[43]]);
        assert_eq!(u64::from(data_size), (MAX_SAMPLES - 1) * BYTES_PER_SAMPLE);
    }

    #[test]
    fn test_close_before_write_creates_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.wav");

        let sink = WavFileSink::new(&path, 8000);
        assert!(sink.close().is_ok());
        assert!(!path.exists());
    }
}
