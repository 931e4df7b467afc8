//! Deus Ex: Human Revolution, the built-in sample game.

use tracing::info;

use super::{GameDefinition, GameStateMapper, Metadata};
use crate::effect::{EffectDescriptor, EffectId, Patch};
use crate::error::Result;
use crate::preset::GameId;
use crate::process::{Pointer, PointerPath, Process};

pub const ID: GameId = GameId::from_u128(0x0726_ffc3_4129_4293_ac07_f5c7_2c6d_f878);

pub const NAME: &str = "Deus Ex: Human Revolution";

pub const EXECUTABLE: &str = "dxhr.exe";

/// Static offsets into `dxhr.exe`.
pub mod layout {
    /// Non-zero while a level is loading
    pub const LOADING: u64 = 0x1876708;
    /// Non-zero while the pause menu is open
    pub const PAUSED: u64 = 0x18726B0;
    /// Name of the current stream group (map), NUL-terminated
    pub const STREAM_GROUP: u64 = 0x1857924;
    pub const STREAM_GROUP_LENGTH: usize = 55;
    /// Map a new run starts in
    pub const PROLOGUE_STREAM_GROUP: &str = "det_sarifhq_rail_tutorial";

    pub const PLAYER: u64 = 0x01858238;
    pub const LOADED_BULLETS: [u64; 2] = [0x70, 0x14];
    pub const INVENTORY_BULLETS: [u64; 2] = [0x70, 0x2E];

    pub const PRAXIS_ROOT: u64 = 0x015DE1A8;
    pub const PRAXIS: [u64; 2] = [0x14, 0x140];

    pub const OBJECTIVE_LOCATOR: u64 = 0x1855919;
    pub const DIFFICULTY: u64 = 0x1855950;
    pub const FIELD_OF_VIEW: u64 = 0x1855954;
    pub const RETICLE: u64 = 0x185593C;
    pub const MOUSE_X: u64 = 0x709E38;
    pub const MOUSE_Y: u64 = 0x709E3C;
}

fn path(offset: u64, extra: &[u64]) -> PointerPath {
    PointerPath::new(EXECUTABLE, offset, extra)
}

pub fn definition() -> Result<GameDefinition> {
    GameDefinition::builder(ID, NAME)
        .metadata(Metadata {
            version: "0.1.0".to_string(),
            revision: 0,
            project_url: Some("https://github.com/dotStart/Pandemonium".to_string()),
            reporting_url: Some("https://github.com/dotstart/Pandemonium/issues/new".to_string()),
            authors: vec![".start".to_string()],
        })
        .executable(EXECUTABLE)
        .effects(effects()?)
        .state_mapper(|process: &Process| -> Result<Box<dyn GameStateMapper>> {
            Ok(Box::new(DxhrStateMapper::new(process)?))
        })
        .build()
}

fn effects() -> Result<Vec<EffectDescriptor>> {
    let loaded = path(layout::PLAYER, &layout::LOADED_BULLETS);
    let inventory = path(layout::PLAYER, &layout::INVENTORY_BULLETS);
    let praxis = path(layout::PRAXIS_ROOT, &layout::PRAXIS);

    let bullets = |id: u32, name: &str, loaded_count: u8, inventory_count: u8| {
        EffectDescriptor::builder(EffectId(id), name)
            .group("bullets")
            .requires_readable(loaded.clone(), 1)
            .patches(vec![
                Patch::SetU8 {
                    path: loaded.clone(),
                    value: loaded_count,
                },
                Patch::SetU8 {
                    path: inventory.clone(),
                    value: inventory_count,
                },
            ])
            .build()
    };

    let difficulty = |id: u32, name: &str, value: u8| {
        EffectDescriptor::builder(EffectId(id), name)
            .group("difficulty")
            .patches(vec![Patch::SetU8 {
                path: path(layout::DIFFICULTY, &[]),
                value,
            }])
            .build()
    };

    let fov = |id: u32, name: &str, value: i32| {
        EffectDescriptor::builder(EffectId(id), name)
            .group("fov")
            .patches(vec![Patch::SetI32 {
                path: path(layout::FIELD_OF_VIEW, &[]),
                value,
            }])
            .build()
    };

    let mouse = |id: u32, name: &str, group: &str, offset: u64, factor: f32| {
        EffectDescriptor::builder(EffectId(id), name)
            .group(group)
            .patches(vec![Patch::ScaleF32 {
                path: path(offset, &[]),
                factor,
            }])
            .build()
    };

    let toggle = |id: u32, name: &str, offset: u64| {
        EffectDescriptor::builder(EffectId(id), name)
            .patches(vec![Patch::ToggleU8 {
                path: path(offset, &[]),
            }])
            .build()
    };

    let praxis_points = |id: u32, name: &str, value: u8| {
        EffectDescriptor::builder(EffectId(id), name)
            .group("praxis")
            .requires_readable(praxis.clone(), 1)
            .patches(vec![Patch::SetU8 {
                path: praxis.clone(),
                value,
            }])
            .build()
    };

    Ok(vec![
        bullets(0, "Bullets empty", 1, 0)?,
        bullets(1, "Bullets full", 127, 127)?,
        difficulty(2, "Difficulty easy", 0)?,
        difficulty(3, "Difficulty hard", 2)?,
        difficulty(4, "Difficulty medium", 1)?,
        fov(5, "Field of view high", 179)?,
        fov(6, "Field of view low", 20)?,
        mouse(7, "Mouse X high", "mouse_x", layout::MOUSE_X, 4.0)?,
        mouse(8, "Mouse X invert", "mouse_x", layout::MOUSE_X, -1.0)?,
        mouse(9, "Mouse X low", "mouse_x", layout::MOUSE_X, 0.25)?,
        mouse(10, "Mouse Y high", "mouse_y", layout::MOUSE_Y, 4.0)?,
        mouse(11, "Mouse Y invert", "mouse_y", layout::MOUSE_Y, -1.0)?,
        mouse(12, "Mouse Y low", "mouse_y", layout::MOUSE_Y, 0.25)?,
        toggle(13, "Objective locator", layout::OBJECTIVE_LOCATOR)?,
        praxis_points(14, "Praxis high", 127)?,
        praxis_points(15, "Praxis low", 0)?,
        toggle(16, "Reticle", layout::RETICLE)?,
    ])
}

/// Reads pause and loading flags, and detects a new run by the player
/// entering the prologue map from any other map.
pub struct DxhrStateMapper {
    loading: Pointer,
    paused: Pointer,
    stream_group: Pointer,
    current_map: Option<String>,
}

impl DxhrStateMapper {
    pub fn new(process: &Process) -> Result<Self> {
        Ok(Self {
            loading: process.pointer(EXECUTABLE, layout::LOADING, &[])?,
            paused: process.pointer(EXECUTABLE, layout::PAUSED, &[])?,
            stream_group: process.pointer(EXECUTABLE, layout::STREAM_GROUP, &[])?,
            current_map: None,
        })
    }
}

impl GameStateMapper for DxhrStateMapper {
    fn is_paused(&mut self, process: &Process) -> Result<bool> {
        Ok(self.loading.read_u8(process, 0)? == 1 || self.paused.read_u8(process, 0)? == 1)
    }

    fn has_reset(&mut self, process: &Process) -> Result<bool> {
        let map = self
            .stream_group
            .read_string(process, 0, layout::STREAM_GROUP_LENGTH)?;

        let changed = self
            .current_map
            .as_ref()
            .is_none_or(|current| !current.eq_ignore_ascii_case(&map));
        if !map.is_empty() && changed {
            if let Some(current) = &self.current_map {
                info!("Leaving map {}", current);
            }
            info!("Entering map {}", map);
        }

        let reset = self.current_map.is_some()
            && changed
            && map.eq_ignore_ascii_case(layout::PROLOGUE_STREAM_GROUP);
        self.current_map = Some(map);
        Ok(reset)
    }
}
