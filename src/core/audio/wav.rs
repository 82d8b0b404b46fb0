use super::error::AudioError;
use log::{error, info};
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType};
use std::path::Path;

pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Reads a 16-bit PCM WAV file as mono f32 samples, returning them with the file's sample rate.
pub fn load_wav_mono_f32(path: &Path) -> Result<(Vec<f32>, u32), AudioError> {
    info!("📖 Reading WAV file: {:?}", path);
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;
    let estimated_samples = reader.duration() as usize;
    let mut samples = Vec::with_capacity(estimated_samples.max(128));

    info!(
        "📊 WAV spec: {} Hz, {} channels, {} bits",
        spec.sample_rate, spec.channels, spec.bits_per_sample
    );

    if spec.sample_rate == 0 {
        return Err(AudioError::Wav(hound::Error::FormatError(
            "invalid sample rate",
        )));
    }

    // 多声道取平均混成单声道
    let mut frame_sum = 0.0f32;
    let mut in_frame = 0usize;
    for s in reader.samples::<i16>() {
        frame_sum += s? as f32 / i16::MAX as f32;
        in_frame += 1;
        if in_frame == channels {
            samples.push(frame_sum / channels as f32);
            frame_sum = 0.0;
            in_frame = 0;
        }
    }

    info!("✓ Loaded {} mono samples from file", samples.len());
    Ok((samples, spec.sample_rate))
}

pub fn write_wav_mono_i16(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), AudioError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        let v = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(v)?;
    }
    writer.finalize()?;
    Ok(())
}

pub fn resample_to_16k_mono(input: &[f32], in_rate: u32) -> Result<Vec<f32>, AudioError> {
    if in_rate == TARGET_SAMPLE_RATE || input.is_empty() {
        return Ok(input.to_vec());
    }

    if in_rate % TARGET_SAMPLE_RATE == 0 {
        let factor = (in_rate / TARGET_SAMPLE_RATE) as usize;
        info!(
            "⚡ Fast downsample from {} Hz to 16 kHz (factor {})",
            in_rate, factor
        );
        return Ok(downsample_by_factor(input, factor));
    }

    info!(
        "🔧 Resampling {} samples from {} Hz to 16 kHz",
        input.len(),
        in_rate
    );
    let ratio = TARGET_SAMPLE_RATE as f64 / in_rate as f64;
    let params = SincInterpolationParameters {
        sinc_len: 48,
        f_cutoff: 0.90,
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 4,
        window: rubato::WindowFunction::BlackmanHarris2,
    };

    let mut resampler =
        SincFixedIn::<f32>::new(ratio, 1.0, params, input.len(), 1).map_err(|e| {
            error!("❌ Resample creation failed: {}", e);
            AudioError::Resample(e.to_string())
        })?;

    let mut output = vec![vec![0.0f32; resampler.output_frames_max()]];
    let (_, written) = resampler
        .process_into_buffer(&[input], &mut output, None)
        .map_err(|e| {
            error!("❌ Resample processing failed: {}", e);
            AudioError::Resample(e.to_string())
        })?;

    let mut result = output.into_iter().next().unwrap_or_default();
    result.truncate(written);
    info!(
        "✓ Resampling complete: {} -> {} samples",
        input.len(),
        result.len()
    );
    Ok(result)
}

/// Quickly downsample by averaging consecutive frames when the ratio is an integer
fn downsample_by_factor(input: &[f32], factor: usize) -> Vec<f32> {
    debug_assert!(factor > 0);
    let mut output = Vec::with_capacity(input.len().div_ceil(factor));
    let mut accumulator = 0.0_f32;
    let mut count = 0;

    for &sample in input {
        accumulator += sample;
        count += 1;
        if count == factor {
            output.push(accumulator / factor as f32);
            accumulator = 0.0;
            count = 0;
        }
    }

    if count > 0 {
        output.push(accumulator / count as f32);
    }

    output
}

/// Rewrites `input` as 16 kHz mono into `output` unless it already is; returns the path to use.
pub fn normalize_to_16k_mono(input: &Path, output: &Path) -> Result<std::path::PathBuf, AudioError> {
    let spec = hound::WavReader::open(input)?.spec();
    if spec.sample_rate == TARGET_SAMPLE_RATE && spec.channels == 1 && spec.bits_per_sample == 16 {
        return Ok(input.to_path_buf());
    }

    let (samples, rate) = load_wav_mono_f32(input)?;
    let resampled = resample_to_16k_mono(&samples, rate)?;
    write_wav_mono_i16(output, &resampled, TARGET_SAMPLE_RATE)?;
    Ok(output.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_stereo(path: &Path, rate: u32, frames: usize) {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..frames {
            writer.write_sample(i16::MAX / 2).unwrap();
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_downsample_by_factor() {
        let out = downsample_by_factor(&[1.0, 3.0, 5.0, 7.0, 9.0], 2);
        assert_eq!(out, vec![2.0, 6.0, 9.0]);
    }

    #[test]
    fn test_stereo_is_mixed_down() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_stereo(&path, 16_000, 100);

        let (samples, rate) = load_wav_mono_f32(&path).unwrap();
        assert_eq!(rate, 16_000);
        assert_eq!(samples.len(), 100);
        assert!((samples[0] - 0.25).abs() < 0.01);
    }

    #[test]
    fn test_normalize_resamples_48k() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.wav");
        let output = dir.path().join("out.wav");
        write_stereo(&input, 48_000, 4800);

        let used = normalize_to_16k_mono(&input, &output).unwrap();
        assert_eq!(used, output);

        let reader = hound::WavReader::open(&output).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.duration(), 1600);
    }

    #[test]
    fn test_normalize_keeps_conforming_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("mono.wav");
        write_wav_mono_i16(&input, &[0.0; 160], 16_000).unwrap();

        let used = normalize_to_16k_mono(&input, &dir.path().join("unused.wav")).unwrap();
        assert_eq!(used, input);
    }
}
