use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use hound::{SampleFormat, WavSpec, WavWriter};
use trackbreak::audio::open_source;
use trackbreak::waveform::summarize;

fn write_fixture(path: &std::path::Path, seconds: u32) {
    let spec = WavSpec {
        channels: 2,
        sample_rate: 44_100,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();
    for frame in 0..44_100 * seconds {
        let sample = ((frame % 441) as i32 - 220) * 140;
        writer.write_sample(sample as i16).unwrap();
        writer.write_sample((sample / 3) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

fn bench_summarize(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("minute.wav");
    write_fixture(&path, 60);

    c.bench_with_input(BenchmarkId::new("summarize_wav", "60s_stereo"), &path, |b, path| {
        b.iter(|| {
            let mut source = open_source(path).unwrap();
            let summary = summarize(source.as_mut(), &mut |_| {}).unwrap();
            black_box(summary.len())
        })
    });
}

criterion_group!(benches, bench_summarize);
criterion_main!(benches);
