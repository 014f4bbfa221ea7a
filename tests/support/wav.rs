use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

pub fn stereo_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Write a 16-bit stereo sawtooth that crosses zero every 200 frames.
pub fn write_stereo_wav(path: &Path, sample_rate: u32, frames: u32) {
    let mut writer = WavWriter::create(path, stereo_spec(sample_rate)).unwrap();
    for frame in 0..frames {
        let left = ((frame % 200) as i32 - 100) * 300;
        writer.write_sample(left as i16).unwrap();
        writer.write_sample((-left / 2) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

pub fn read_samples(path: &Path) -> (WavSpec, Vec<i32>) {
    let mut reader = WavReader::open(path).unwrap();
    let spec = reader.spec();
    let samples = reader.samples::<i32>().map(Result::unwrap).collect();
    (spec, samples)
}

pub fn frame_count(path: &Path) -> u32 {
    WavReader::open(path).unwrap().duration()
}
