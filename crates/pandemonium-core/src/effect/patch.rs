use serde::{Deserialize, Serialize};
use tracing::warn;

use super::Effect;
use crate::error::Result;
use crate::process::{PointerPath, Process};

/// One memory edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Patch {
    SetU8 { path: PointerPath, value: u8 },
    SetI32 { path: PointerPath, value: i32 },
    SetF32 { path: PointerPath, value: f32 },
    /// Write 0 if the byte is 1, otherwise 1.
    ToggleU8 { path: PointerPath },
    ScaleF32 { path: PointerPath, factor: f32 },
}

impl Patch {
    pub fn path(&self) -> &PointerPath {
        match self {
            Patch::SetU8 { path, .. }
            | Patch::SetI32 { path, .. }
            | Patch::SetF32 { path, .. }
            | Patch::ToggleU8 { path }
            | Patch::ScaleF32 { path, .. } => path,
        }
    }

    fn width(&self) -> usize {
        match self {
            Patch::SetU8 { .. } | Patch::ToggleU8 { .. } => 1,
            Patch::SetI32 { .. } | Patch::SetF32 { .. } | Patch::ScaleF32 { .. } => 4,
        }
    }

    /// Bytes to write given the bytes currently in memory.
    fn patched(&self, original: &[u8]) -> Vec<u8> {
        match self {
            Patch::SetU8 { value, .. } => vec![*value],
            Patch::SetI32 { value, .. } => value.to_le_bytes().to_vec(),
            Patch::SetF32 { value, .. } => value.to_le_bytes().to_vec(),
            Patch::ToggleU8 { .. } => vec![u8::from(original[0] != 1)],
            Patch::ScaleF32 { factor, .. } => {
                let current = f32::from_le_bytes([original[0], original[1], original[2], original[3]]);
                (current * factor).to_le_bytes().to_vec()
            }
        }
    }
}

/// Applies a list of patches in order and restores the saved bytes in
/// reverse order on revert.
#[derive(Debug, Clone)]
pub struct PatchEffect {
    patches: Vec<Patch>,
    saved: Vec<(PointerPath, Vec<u8>)>,
}

impl PatchEffect {
    pub fn new(patches: Vec<Patch>) -> Self {
        Self {
            patches,
            saved: Vec::new(),
        }
    }

    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }
}

impl PatchEffect {
    fn write_all(&mut self, process: &Process) -> Result<()> {
        for patch in &self.patches {
            let pointer = process.pointer_path(patch.path())?;
            let original = pointer.read_bytes(process, 0, patch.width())?;
            pointer.write_bytes(process, 0, &patch.patched(&original))?;
            self.saved.push((patch.path().clone(), original));
        }
        Ok(())
    }
}

impl Effect for PatchEffect {
    /// Either every patch is written or memory is left as it was found.
    fn apply(&mut self, process: &Process) -> Result<()> {
        self.saved.clear();
        if let Err(e) = self.write_all(process) {
            if let Err(restore) = self.revert(process) {
                warn!("Failed to restore partially applied patches: {}", restore);
            }
            return Err(e);
        }
        Ok(())
    }

    fn revert(&mut self, process: &Process) -> Result<()> {
        while let Some((path, original)) = self.saved.pop() {
            process
                .pointer_path(&path)?
                .write_bytes(process, 0, &original)?;
        }
        Ok(())
    }
}
