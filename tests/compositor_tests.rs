use image::{Rgb, Rgb32FImage, Rgba, RgbaImage};
use mask_map::{
    Backend, ChannelRole, ChannelSpec, Compositor, Error, ImageSource, InvalidInput, MaskInputs,
    ParallelCompositor, SequentialCompositor, composite,
};

fn assert_uniform(mask: &RgbaImage, expected: [u8; 4]) {
    for (x, y, pixel) in mask.enumerate_pixels() {
        assert_eq!(pixel.0, expected, "pixel ({x}, {y})");
    }
}

/// Deterministic coloured noise so every pixel differs from its neighbours.
fn noise_source(width: u32, height: u32, seed: u32) -> ImageSource {
    let mut img = Rgb32FImage::new(width, height);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let mut v = x.wrapping_mul(73_856_093) ^ y.wrapping_mul(19_349_663) ^ seed;
        let mut channel = || {
            v ^= v << 13;
            v ^= v >> 17;
            v ^= v << 5;
            (v % 1000) as f32 / 999.0
        };
        *pixel = Rgb([channel(), channel(), channel()]);
    }
    ImageSource::new(img)
}

#[test]
fn fallback_and_roughness_scenario() {
    let white = ImageSource::solid(4, 4, 1.0);
    let rough = ImageSource::solid(4, 4, 0.5);
    let inputs = MaskInputs {
        metallic: ChannelSpec::value(0.5),
        occlusion: ChannelSpec::texture(&white),
        detail: ChannelSpec::detail(None),
        smoothness: ChannelSpec::texture(&rough),
        treat_as_roughness: true,
    };

    let resolved = inputs.resolve(2, 3);
    let expected = [0.5, 1.0, 0.0, 0.5];
    for (got, want) in resolved.iter().zip(expected) {
        assert!((got - want).abs() < 1e-6, "{resolved:?}");
    }

    let mask = composite(&inputs, Backend::Sequential).unwrap();
    assert_eq!(mask.dimensions(), (4, 4));
    assert_uniform(&mask, [128, 255, 0, 128]);
}

#[test]
fn all_channels_from_solid_textures() {
    let metallic = ImageSource::solid(2, 2, 0.2);
    let occlusion = ImageSource::solid(2, 2, 0.8);
    let detail = ImageSource::solid(2, 2, 0.4);
    let smoothness = ImageSource::solid(2, 2, 0.6);
    let inputs = MaskInputs {
        metallic: ChannelSpec::texture(&metallic),
        occlusion: ChannelSpec::texture(&occlusion),
        detail: ChannelSpec::detail(Some(&detail)),
        smoothness: ChannelSpec::texture(&smoothness),
        treat_as_roughness: false,
    };

    let resolved = inputs.resolve(1, 1);
    for (got, want) in resolved.iter().zip([0.2, 0.8, 0.4, 0.6]) {
        assert!((got - want).abs() < 1e-6, "{resolved:?}");
    }
    let mask = composite(&inputs, Backend::Parallel).unwrap();
    assert_uniform(&mask, [51, 204, 102, 153]);
}

#[test]
fn no_sources_is_invalid_input() {
    let inputs = MaskInputs::default();
    for backend in [Backend::Sequential, Backend::Parallel, Backend::Gpu] {
        let err = composite(&inputs, backend).unwrap_err();
        assert!(
            matches!(err, Error::InvalidInput(InvalidInput::NoSources)),
            "{backend}: {err}"
        );
    }
}

#[test]
fn mismatched_sources_are_rejected() {
    let metallic = ImageSource::solid(64, 64, 0.3);
    let occlusion = ImageSource::solid(32, 32, 0.3);
    let inputs = MaskInputs {
        metallic: ChannelSpec::texture(&metallic),
        occlusion: ChannelSpec::texture(&occlusion),
        ..Default::default()
    };

    let err = SequentialCompositor.composite(&inputs).unwrap_err();
    match err {
        Error::InvalidInput(InvalidInput::DimensionMismatch {
            role,
            expected,
            found,
        }) => {
            assert_eq!(role, ChannelRole::Occlusion);
            assert_eq!(expected, (64, 64));
            assert_eq!(found, (32, 32));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(ParallelCompositor::default().composite(&inputs).is_err());
}

#[test]
fn empty_source_is_rejected() {
    let empty = ImageSource::solid(0, 5, 0.3);
    let inputs = MaskInputs {
        detail: ChannelSpec::detail(Some(&empty)),
        ..Default::default()
    };
    let err = composite(&inputs, Backend::Parallel).unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidInput(InvalidInput::EmptySource {
            role: ChannelRole::Detail
        })
    ));
}

#[test]
fn non_finite_fallback_is_rejected() {
    let detail = ImageSource::solid(2, 2, 0.3);
    let inputs = MaskInputs {
        metallic: ChannelSpec::value(f32::NAN),
        detail: ChannelSpec::detail(Some(&detail)),
        ..Default::default()
    };
    let err = composite(&inputs, Backend::Sequential).unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidInput(InvalidInput::NonFiniteFallback {
            role: ChannelRole::Metallic
        })
    ));
}

#[test]
fn first_present_source_sets_dimensions() {
    let detail = ImageSource::solid(7, 3, 0.0);
    let smoothness = ImageSource::solid(7, 3, 1.0);
    let inputs = MaskInputs {
        detail: ChannelSpec::detail(Some(&detail)),
        smoothness: ChannelSpec::texture(&smoothness),
        ..Default::default()
    };
    assert_eq!(inputs.dimensions().unwrap(), (7, 3));
}

#[test]
fn roughness_flag_ignored_without_source() {
    let occlusion = ImageSource::solid(3, 3, 1.0);
    let inputs = MaskInputs {
        occlusion: ChannelSpec::texture(&occlusion),
        smoothness: ChannelSpec::value(0.2),
        treat_as_roughness: true,
        ..Default::default()
    };
    let mask = composite(&inputs, Backend::Sequential).unwrap();
    assert_uniform(&mask, [128, 255, 0, 51]);
}

#[test]
fn detail_fallback_is_black() {
    let metallic = ImageSource::solid(2, 2, 1.0);
    let inputs = MaskInputs {
        metallic: ChannelSpec::texture(&metallic),
        detail: ChannelSpec::detail(None).with_fallback(0.9),
        ..Default::default()
    };
    let mask = composite(&inputs, Backend::Sequential).unwrap();
    assert_eq!(mask.get_pixel(0, 0)[2], 0);
}

#[test]
fn coloured_sources_use_luma_weights() {
    let mut red = Rgb32FImage::new(1, 1);
    red.put_pixel(0, 0, Rgb([1.0, 0.0, 0.0]));
    let red = ImageSource::new(red);
    let inputs = MaskInputs {
        metallic: ChannelSpec::texture(&red),
        ..Default::default()
    };
    let mask = composite(&inputs, Backend::Sequential).unwrap();
    // 0.299 * 255 + 0.5 = 76.7
    assert_eq!(mask.get_pixel(0, 0)[0], 76);
}

#[test]
fn eight_bit_textures_convert_without_gamma() {
    let rgba = RgbaImage::from_pixel(2, 2, Rgba([102, 102, 102, 7]));
    let source = ImageSource::from_rgba8(&rgba);
    let inputs = MaskInputs {
        occlusion: ChannelSpec::texture(&source),
        ..Default::default()
    };
    let mask = composite(&inputs, Backend::Sequential).unwrap();
    assert_eq!(mask.get_pixel(1, 1)[1], 102);
}

#[test]
fn sequential_and_parallel_are_identical() {
    // Sizes chosen so the last row and column of tiles are partial.
    let (w, h) = (53, 29);
    let metallic = noise_source(w, h, 1);
    let occlusion = noise_source(w, h, 2);
    let detail = noise_source(w, h, 3);
    let smoothness = noise_source(w, h, 4);

    for treat_as_roughness in [false, true] {
        let inputs = MaskInputs {
            metallic: ChannelSpec::texture(&metallic),
            occlusion: ChannelSpec::texture(&occlusion),
            detail: ChannelSpec::detail(Some(&detail)),
            smoothness: ChannelSpec::texture(&smoothness),
            treat_as_roughness,
        };
        let sequential = SequentialCompositor.composite(&inputs).unwrap();
        for tile_size in [1, 3, 8, 64] {
            let parallel = ParallelCompositor::new(tile_size)
                .composite(&inputs)
                .unwrap();
            assert_eq!(
                sequential.as_raw(),
                parallel.as_raw(),
                "tile size {tile_size}, roughness {treat_as_roughness}"
            );
        }
    }
}

#[test]
fn mixed_sources_and_fallbacks_match_across_backends() {
    let (w, h) = (17, 9);
    let occlusion = noise_source(w, h, 11);
    let smoothness = noise_source(w, h, 12);
    let inputs = MaskInputs {
        metallic: ChannelSpec::value(0.73),
        occlusion: ChannelSpec::texture(&occlusion),
        detail: ChannelSpec::detail(None),
        smoothness: ChannelSpec::texture(&smoothness),
        treat_as_roughness: true,
    };
    let sequential = composite(&inputs, Backend::Sequential).unwrap();
    let parallel = composite(&inputs, Backend::Parallel).unwrap();
    assert_eq!(sequential, parallel);
}

#[test]
fn composite_is_deterministic() {
    let metallic = noise_source(16, 16, 5);
    let inputs = MaskInputs {
        metallic: ChannelSpec::texture(&metallic),
        treat_as_roughness: true,
        ..Default::default()
    };
    for backend in [Backend::Sequential, Backend::Parallel] {
        let first = composite(&inputs, backend).unwrap();
        let second = composite(&inputs, backend).unwrap();
        assert_eq!(first, second, "{backend}");
    }
}

#[test]
#[ignore = "requires a wgpu adapter; run with --ignored on a machine with a GPU"]
fn gpu_matches_cpu() {
    let (w, h) = (21, 13);
    let metallic = noise_source(w, h, 21);
    let detail = noise_source(w, h, 22);
    let smoothness = noise_source(w, h, 23);
    let inputs = MaskInputs {
        metallic: ChannelSpec::texture(&metallic),
        occlusion: ChannelSpec::value(0.25),
        detail: ChannelSpec::detail(Some(&detail)),
        smoothness: ChannelSpec::texture(&smoothness),
        treat_as_roughness: true,
    };

    let gpu = composite(&inputs, Backend::Gpu).unwrap();
    let cpu = composite(&inputs, Backend::Sequential).unwrap();
    assert_eq!(gpu.dimensions(), cpu.dimensions());
    for (a, b) in gpu.as_raw().iter().zip(cpu.as_raw()) {
        assert!(a.abs_diff(*b) <= 1, "gpu {a} vs cpu {b}");
    }
}
