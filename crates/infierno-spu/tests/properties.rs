//! Property-based tests for the SPU emulation.

use proptest::prelude::*;

use infierno_core::{Module, Mono};
use infierno_spu::adpcm::{self, BLOCK_SIZE};
use infierno_spu::{Adpcm, Envelope};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// The envelope volume stays inside [0, 1] for any register settings,
    /// through every phase and across a release.
    #[test]
    fn envelope_volume_is_always_in_range(
        spu_ads in any::<u16>(),
        spu_sr in any::<u16>(),
        release_after in 0usize..5_000,
    ) {
        let mut envelope = Envelope::new(spu_ads, spu_sr);
        let mut v: Mono = 0.0;
        for tick in 0..10_000 {
            if tick == release_after {
                envelope.release();
            }
            envelope.next(&mut v).unwrap();
            prop_assert!((0.0..=1.0).contains(&v), "tick {}: {}", tick, v);
        }
    }

    /// A fast-release envelope always terminates after release, and stays
    /// terminated.
    #[test]
    fn fast_release_always_terminates(
        spu_ads in any::<u16>(),
        sustain_bits in 0u16..0x400,
    ) {
        // Keep the release shift small so termination is quick.
        let spu_sr = sustain_bits & 0xffc0;
        let mut envelope = Envelope::new(spu_ads, spu_sr);
        let mut v: Mono = 0.0;
        for _ in 0..1_000 {
            envelope.next(&mut v).unwrap();
        }
        envelope.release();
        let mut ticks = 0u32;
        while envelope.next(&mut v).unwrap() {
            ticks += 1;
            prop_assert!(ticks < 200_000, "release did not terminate");
        }
        prop_assert_eq!(v, 0.0);
        prop_assert!(!envelope.is_running());
    }

    /// Every decoded ADPCM sample is a valid 16-bit value and the decoder
    /// always terminates on non-repeating data.
    #[test]
    fn adpcm_output_is_bounded(
        payload in prop::collection::vec(any::<u8>(), 14),
        header in 0u8..0x50,
        blocks in 1usize..5,
    ) {
        let mut data = Vec::new();
        for index in 0..blocks {
            let mut block = vec![header, 0x00];
            block.extend(&payload);
            block.resize(BLOCK_SIZE, 0);
            if index + 1 == blocks {
                block[1] = 0x01;
            }
            data.extend(block);
        }

        let mut decoder = Adpcm::new(&data, 1);
        let mut samples = 0usize;
        let mut s: Mono = 0.0;
        while decoder.next(&mut s).unwrap() {
            prop_assert!((-1.0..=1.0).contains(&s));
            samples += 1;
            prop_assert!(samples <= blocks * 28, "decoder over-ran its data");
        }
        prop_assert_eq!(samples, blocks * 28);
    }

    /// Editing ADPCM data never breaks the block structure, and the final
    /// block keeps carrying the final flag.
    #[test]
    fn adpcm_edits_preserve_structure(
        blocks in 2usize..8,
        silence in 0usize..3,
        remove in 0usize..3,
    ) {
        prop_assume!(silence + remove < blocks);
        let mut data = vec![0x11u8; blocks * BLOCK_SIZE];
        for block in 0..blocks {
            data[block * BLOCK_SIZE] = 0x00;
            data[block * BLOCK_SIZE + 1] = 0x00;
        }
        data[(blocks - 1) * BLOCK_SIZE + 1] = 0x01;

        adpcm::edit_adpcm(&mut data, silence, remove);
        prop_assert_eq!(data.len(), (blocks - remove) * BLOCK_SIZE);
        prop_assert!(adpcm::is_final(&data[data.len() - BLOCK_SIZE..]));
    }
}
