use std::time::{Duration, Instant};

use prism_vision::core_modules::change_gate::{FrameChangeGate, GateScope};
use prism_vision::core_modules::classifier::features_from_rgb;
use prism_vision::core_modules::color_space::{ColorTemperature, rgb_to_color_temperature, rgb_to_hsl, rgb_to_hsv};
use prism_vision::core_modules::geometry::{RoiResolver, default_buffer_roi};
use prism_vision::core_modules::sampler::{ColorSampler, SampleSource};
use prism_vision::{
    KnnClassifier, Layout, PixelBuffer, PixelFormat, ProbeError, ProbePipeline, RawSettings, Roi, Settings, Size,
    TickReport, TrainingDataPoint, TrainingTable,
};

fn solid(width: u32, height: u32, rgb: [u8; 3]) -> PixelBuffer {
    let data = rgb.repeat((width * height) as usize);
    PixelBuffer::new(width, height, PixelFormat::Rgb8, data).unwrap()
}

/// 10x10 frame whose first `changed_rows` rows are white and the rest black.
fn rows_changed(changed_rows: u32) -> PixelBuffer {
    let mut data = Vec::new();
    for y in 0..10 {
        let value = if y < changed_rows { 255 } else { 0 };
        data.extend(std::iter::repeat_n(value, 30));
    }
    PixelBuffer::new(10, 10, PixelFormat::Rgb8, data).unwrap()
}

#[test]
fn hue_and_percentages_stay_in_range() {
    for r in (0..=255u16).step_by(15) {
        for g in (0..=255u16).step_by(15) {
            for b in (0..=255u16).step_by(15) {
                let (r, g, b) = (r as u8, g as u8, b as u8);
                let hsv = rgb_to_hsv(r, g, b);
                let hsl = rgb_to_hsl(r, g, b);
                assert!((0.0..360.0).contains(&hsv.h), "hsv hue {} for {:?}", hsv.h, (r, g, b));
                assert!((0.0..360.0).contains(&hsl.h));
                for value in [hsv.s, hsv.v, hsl.s, hsl.l] {
                    assert!((0.0..=100.0).contains(&value), "{} for {:?}", value, (r, g, b));
                }
            }
        }
    }
}

#[test]
fn black_has_no_light_source() {
    assert_eq!(rgb_to_color_temperature(0, 0, 0), ColorTemperature::NoLightSource);
}

#[test]
fn kelvin_is_always_clamped() {
    for (r, g, b) in [(255, 0, 0), (0, 255, 0), (0, 0, 255), (255, 255, 255), (1, 0, 0), (10, 200, 90)] {
        match rgb_to_color_temperature(r, g, b) {
            ColorTemperature::Kelvin { kelvin, .. } => assert!((1000.0..=25000.0).contains(&kelvin)),
            other => panic!("expected a Kelvin value for {:?}, got {:?}", (r, g, b), other),
        }
    }
}

#[test]
fn roi_inside_display_resolves_inside_buffer() {
    // 1280x720 video pillarboxed in a 1000x1000 container: display rect is 1000x562.5 at y=218.75.
    let layout = Layout::new(Size::new(1280.0, 720.0), Size::new(1000.0, 1000.0));
    let settings = Settings::default();
    for roi in [
        Roi::new(0.0, 218.75, 10.0, 10.0),
        Roi::new(400.0, 400.0, 200.0, 150.0),
        Roi::new(990.0, 770.0, 10.0, 11.25),
    ] {
        let resolved = RoiResolver::resolve(Some(&roi), &layout, 1280, 720, &settings);
        assert!(!resolved.used_default, "{:?}", roi);
        assert!(resolved.rect.area() > 0);
        assert!(resolved.rect.right() <= 1280 && resolved.rect.bottom() <= 720);
    }
}

#[test]
fn roi_outside_display_uses_centered_default() {
    let layout = Layout::new(Size::new(1280.0, 720.0), Size::new(1000.0, 1000.0));
    // Lies in the letterbox bar above the picture.
    let stale = Roi::new(100.0, 10.0, 100.0, 100.0);
    let resolved = RoiResolver::resolve(Some(&stale), &layout, 1280, 720, &Settings::default());
    assert!(resolved.used_default);
    assert_eq!(default_buffer_roi(1280, 720).width, 180);

    // The default square is then eroded like any other region.
    let margin = 18;
    assert_eq!(resolved.rect.width, 180 - 2 * margin);
    let (cx, cy) = resolved.rect.center();
    assert_eq!((cx, cy), (640.0, 360.0));
}

#[test]
fn saturated_background_regions_still_sample() {
    let settings = Settings::default();
    for rgb in [[0, 0, 0], [255, 255, 255]] {
        let frame = solid(16, 16, rgb);
        let sample = ColorSampler::sample(&frame, &frame.bounds(), &settings).unwrap();
        assert_eq!(sample.source, SampleSource::Unfiltered);
        assert_eq!([sample.r, sample.g, sample.b], rgb);
        assert!(sample.pixel_count > 0);
    }
}

#[test]
fn classifier_lifecycle_errors() {
    let classifier = KnnClassifier::default();
    assert!(matches!(classifier.train(&[]), Err(ProbeError::Input { .. })));
    assert!(matches!(
        classifier.predict(&features_from_rgb(1, 1, 1)),
        Err(ProbeError::State { .. })
    ));
}

#[test]
fn gray_reference_scenario() {
    let classifier = KnnClassifier::new(1);
    classifier
        .train(&[
            TrainingDataPoint::from_rgb(10, 10, 10, "A"),
            TrainingDataPoint::from_rgb(200, 200, 200, "B"),
        ])
        .unwrap();

    let a = classifier.predict(&features_from_rgb(12, 11, 9)).unwrap();
    assert_eq!((a.class_name.as_str(), a.confidence), ("A", 1.0));
    let b = classifier.predict(&features_from_rgb(190, 210, 205)).unwrap();
    assert_eq!((b.class_name.as_str(), b.confidence), ("B", 1.0));
}

#[test]
fn identical_frames_pass_only_once() {
    let settings = Settings::default();
    let mut gate = FrameChangeGate::new();
    let frame = rows_changed(3);
    let start = Instant::now();
    assert!(gate.should_process(&frame, GateScope::WholeFrame, &settings, start).should_process());
    let later = start + Duration::from_secs(1);
    assert!(!gate.should_process(&frame, GateScope::WholeFrame, &settings, later).should_process());
}

#[test]
fn sensitivity_scenario() {
    let settings = Settings::from_raw(&RawSettings {
        sensitivity: Some(0.5),
        ..Default::default()
    });
    let start = Instant::now();
    let step = settings.tick_interval();

    let mut gate = FrameChangeGate::new();
    gate.should_process(&rows_changed(0), GateScope::WholeFrame, &settings, start);
    assert!(gate
        .should_process(&rows_changed(6), GateScope::WholeFrame, &settings, start + step)
        .should_process());

    let mut gate = FrameChangeGate::new();
    gate.should_process(&rows_changed(0), GateScope::WholeFrame, &settings, start);
    assert!(!gate
        .should_process(&rows_changed(2), GateScope::WholeFrame, &settings, start + step)
        .should_process());
}

#[test]
fn trained_pipeline_end_to_end() {
    let csv = "\
R,G,B,H,S,V,K,ClassName
255,140,40,29.6,84.3,100.0,2300,tungsten
180,205,255,220.0,29.4,100.0,8500,overcast
";
    let table = TrainingTable::from_reader(csv.as_bytes()).unwrap();
    let mut pipeline = ProbePipeline::with_settings(Settings::default());
    pipeline.classifier().train(&table.points).unwrap();

    // A lamp in the middle of a dark room.
    let mut data = Vec::new();
    for y in 0..64u32 {
        for x in 0..64u32 {
            let lit = (24..40).contains(&x) && (24..40).contains(&y);
            data.extend_from_slice(if lit { &[250, 150, 45] } else { &[4, 4, 6] });
        }
    }
    let frame = PixelBuffer::new(64, 64, PixelFormat::Rgb8, data).unwrap();
    let layout = Layout::native(64, 64);

    let report = pipeline.tick(&frame, &layout, Instant::now());
    let TickReport::Sampled(sample) = report else {
        panic!("expected a sample, got {:?}", report);
    };
    assert_eq!(sample.hex, "#fa962d");
    let classification = sample.classification.unwrap();
    assert_eq!(classification.class_name, "tungsten");
    assert!(classification.confidence > 0.5 && classification.confidence <= 1.0);
}
