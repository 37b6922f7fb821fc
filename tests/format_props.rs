//! Property tests for the format algebra and compiler determinism.

use proptest::prelude::*;

use pipeforge::format::{ChannelLayout, FilterMode, SampleDepth, TextureFormat, WrapMode};
use pipeforge::script::ScriptCompiler;

fn channels() -> impl Strategy<Value = ChannelLayout> {
    prop_oneof![
        Just(ChannelLayout::R),
        Just(ChannelLayout::Rg),
        Just(ChannelLayout::Rgb),
        Just(ChannelLayout::Rgba),
    ]
}

fn depths() -> impl Strategy<Value = SampleDepth> {
    prop_oneof![
        Just(SampleDepth::UnsignedByte),
        Just(SampleDepth::HalfFloat),
        Just(SampleDepth::Float),
    ]
}

fn formats() -> impl Strategy<Value = TextureFormat> {
    (0u32..=4096, 0u32..=4096, channels(), depths())
        .prop_map(|(w, h, c, d)| TextureFormat::new(w, h, c, d))
}

proptest! {
    #[test]
    fn dimensions_never_collapse_to_zero(
        fmt in formats(),
        fx in 0.0f64..4.0,
        fy in 0.0f64..4.0,
        w in 0u32..=4096,
        h in 0u32..=4096,
    ) {
        let scaled = fmt.scaled_by(fx, fy);
        prop_assert!(scaled.width >= 1 && scaled.height >= 1);
        let resized = fmt.resized(w, h);
        prop_assert!(resized.width >= 1 && resized.height >= 1);
    }

    #[test]
    fn scaled_to_adopts_dimensions_and_nothing_else(a in formats(), b in formats()) {
        let adopted = a.scaled_to(&b);
        prop_assert_eq!((adopted.width, adopted.height), (b.width, b.height));
        prop_assert_eq!(adopted.channels, a.channels);
        prop_assert_eq!(adopted.depth, a.depth);
        prop_assert_eq!(adopted.filter, a.filter);
        prop_assert_eq!(adopted.wrap, a.wrap);
    }

    #[test]
    fn element_count_tracks_channel_count(fmt in formats()) {
        let per_channel = fmt.element_count() / fmt.pixel_count();
        prop_assert_eq!(per_channel, u64::from(fmt.channels.channel_count()));
    }

    #[test]
    fn compatibility_is_symmetric_and_ignores_sampling(a in formats(), b in formats()) {
        prop_assert_eq!(a.compatible_with(&b), b.compatible_with(&a));
        let resampled = a.with_filtering(FilterMode::Nearest, WrapMode::Mirror);
        prop_assert!(a.compatible_with(&resampled));
    }

    #[test]
    fn format_scale_module_matches_direct_algebra(
        w in 1u32..=2048,
        h in 1u32..=2048,
        num in 1u32..=8,
    ) {
        let factor = f64::from(num) / 4.0;
        let script = format!(
            "FORMAT:base({w}, {h}, RGBA, UNSIGNED_BYTE)\n\
             CALL:FORMAT_SCALE(derived, base, {factor}, {factor})"
        );
        let compilation = ScriptCompiler::new().compile_text(&script, "prop").unwrap();
        let derived = *compilation.tables.formats.lookup("derived").unwrap();
        let expected = TextureFormat::new(w, h, ChannelLayout::Rgba, SampleDepth::UnsignedByte)
            .scaled_by(factor, factor);
        prop_assert_eq!(derived, expected);
    }

    #[test]
    fn compilation_of_generated_formats_is_deterministic(
        w in 1u32..=4096,
        h in 1u32..=4096,
    ) {
        let script = format!("FORMAT:f({w}, {h}, RG, HALF_FLOAT, NEAREST, REPEAT, 3)");
        let compiler = ScriptCompiler::new();
        let a = compiler.compile_text(&script, "prop").unwrap();
        let b = compiler.compile_text(&script, "prop").unwrap();
        prop_assert_eq!(
            a.tables.formats.lookup("f").copied(),
            b.tables.formats.lookup("f").copied()
        );
    }
}
