//! Patches and the patch bank.
//!
//! A patch is a block of ADPCM encoded audio referenced by id from the
//! sub-instruments of a song. The engine consumes patches as already-parsed
//! records; loading them out of their container files is the host's job.

use infierno_core::{EngineError, Result};

use crate::adpcm;

/// Sampling rate at which all patches are encoded.
pub const PATCH_SAMPLE_RATE: u32 = 11_025;

/// A named block of ADPCM encoded audio.
#[derive(Clone, Debug)]
pub struct Patch {
    /// Patch id, as referenced by sub-instruments.
    pub id: u16,
    /// ADPCM encoded audio data: a whole number of 16-byte blocks, the last
    /// of which carries the final flag.
    pub adpcm: Vec<u8>,
}

impl Patch {
    /// Construct a patch record.
    pub fn new(id: u16, adpcm: Vec<u8>) -> Self {
        Self { id, adpcm }
    }
}

/// Details of a fix for a patch with clicks or pops.
struct PatchFix {
    id: u16,

    // Expected layout, used to validate before editing.
    size: usize,
    repeat_offset: Option<usize>,

    // Blocks to silence at the start and to remove from the end.
    silence_start_blocks: usize,
    remove_end_blocks: usize,
}

// Known-noisy patches shipped with Doom and Final Doom.
const PATCH_FIXES: [PatchFix; 4] = [
    PatchFix {
        id: 96,
        size: 45_744,
        repeat_offset: Some(16),
        silence_start_blocks: 2,
        remove_end_blocks: 1,
    }, // Song 94.
    PatchFix {
        id: 102,
        size: 86_016,
        repeat_offset: Some(45_248),
        silence_start_blocks: 2,
        remove_end_blocks: 0,
    }, // Song 97.
    PatchFix {
        id: 116,
        size: 81_520,
        repeat_offset: Some(0),
        silence_start_blocks: 0,
        remove_end_blocks: 16,
    }, // Song 106.
    PatchFix {
        id: 130,
        size: 44_928,
        repeat_offset: Some(16),
        silence_start_blocks: 0,
        remove_end_blocks: 2,
    }, // Song 114.
];

/// An in-memory collection of patches with lookup by id.
#[derive(Clone, Debug, Default)]
pub struct PatchBank {
    patches: Vec<Patch>,
}

impl PatchBank {
    /// Construct an empty bank.
    pub fn new() -> Self {
        Self::default()
    }

    /// Test if the bank holds no patches.
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Number of patches in the bank.
    pub fn len(&self) -> usize {
        self.patches.len()
    }

    /// Iterate over the patches in bank order.
    pub fn iter(&self) -> impl Iterator<Item = &Patch> {
        self.patches.iter()
    }

    /// Largest patch id in the bank, if any.
    pub fn maximum_patch_id(&self) -> Option<u16> {
        self.patches.iter().map(|p| p.id).max()
    }

    /// Look up a patch by id.
    pub fn patch_by_id(&self, id: u16) -> Option<&Patch> {
        self.patches.iter().find(|p| p.id == id)
    }

    /// Insert a patch, replacing any existing patch with the same id.
    pub fn set_patch(&mut self, id: u16, adpcm: Vec<u8>) {
        match self.patches.iter_mut().find(|p| p.id == id) {
            Some(existing) => existing.adpcm = adpcm,
            None => self.patches.push(Patch::new(id, adpcm)),
        }
    }

    /// Copy over every patch from another bank whose id is not already
    /// present in this one.
    pub fn merge(&mut self, other: &PatchBank) {
        for patch in &other.patches {
            if self.patch_by_id(patch.id).is_none() {
                self.patches.push(patch.clone());
            }
        }
    }

    /// Sort the patches into id order.
    pub fn sort(&mut self) {
        self.patches.sort_by_key(|p| p.id);
    }

    /// Apply the static repair table to the bank.
    ///
    /// Each repair first validates that the patch's size and repeat offset
    /// match the values the fix was written against; a mismatch is fatal
    /// since editing an unexpected patch would corrupt it. Patches absent
    /// from the bank are skipped.
    pub fn repair_patches(&mut self) -> Result<()> {
        for fix in &PATCH_FIXES {
            let Some(patch) = self.patch_by_id(fix.id) else {
                continue;
            };
            if patch.adpcm.len() != fix.size
                || adpcm::repeat_offset(&patch.adpcm) != fix.repeat_offset
            {
                return Err(EngineError::PatchRepairMismatch { id: fix.id });
            }

            let mut edited = patch.adpcm.clone();
            adpcm::edit_adpcm(&mut edited, fix.silence_start_blocks, fix.remove_end_blocks);
            self.set_patch(fix.id, edited);
        }
        Ok(())
    }
}

impl FromIterator<Patch> for PatchBank {
    fn from_iter<I: IntoIterator<Item = Patch>>(iter: I) -> Self {
        Self {
            patches: iter.into_iter().collect(),
        }
    }
}
