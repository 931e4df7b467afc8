use std::sync::Arc;

use tracing::{debug, warn};

use super::GameDefinition;
use crate::effect::EffectId;
use crate::error::{Error, Result};
use crate::preset::{Preset, PresetBuilder};

/// Mutable race settings for one game, before they are frozen into a
/// [`Preset`].
///
/// A fresh configuration has a random seed and every effect of the game
/// enabled.
#[derive(Debug, Clone)]
pub struct GameConfiguration {
    game: Arc<GameDefinition>,
    builder: PresetBuilder,
}

impl GameConfiguration {
    pub fn new(game: Arc<GameDefinition>) -> Self {
        let mut builder = game.preset_builder();
        builder.seed(random_seed());
        Self { game, builder }
    }

    pub fn game(&self) -> &Arc<GameDefinition> {
        &self.game
    }

    pub fn builder(&self) -> &PresetBuilder {
        &self.builder
    }

    /// Chances, ranges and seed are edited through the builder directly.
    pub fn builder_mut(&mut self) -> &mut PresetBuilder {
        &mut self.builder
    }

    pub fn set_effect_enabled(&mut self, id: EffectId, enabled: bool) -> Result<()> {
        if !self.game.effects().contains(id) {
            return Err(Error::InvalidConfig(format!(
                "{} has no effect {}",
                self.game.name(),
                id
            )));
        }

        if enabled {
            self.builder.add_effect(id);
        } else {
            self.builder.remove_effect(id);
        }
        Ok(())
    }

    pub fn is_effect_enabled(&self, id: EffectId) -> bool {
        self.builder.has_effect(id)
    }

    /// Replace the seed with 64 random bits in hex.
    pub fn generate_seed(&mut self) -> &str {
        self.builder.seed(random_seed());
        self.builder.current_seed()
    }

    pub fn preset(&self) -> Preset {
        self.builder.build()
    }

    /// Load a shared preset into this configuration.
    ///
    /// Effect ids this game does not know are dropped. The configuration
    /// keeps the game's own revision, so a preset from another revision is
    /// accepted with a warning and re-shared under the current one.
    pub fn apply_preset(&mut self, preset: &Preset) -> Result<()> {
        if preset.game_id() != self.game.id() {
            return Err(Error::PresetGameMismatch {
                expected: self.game.id().to_string(),
                actual: preset.game_id().to_string(),
            });
        }

        if preset.revision() != self.game.revision() {
            warn!(
                "Preset was made for revision {} of {}, running revision {}",
                preset.revision(),
                self.game.name(),
                self.game.revision()
            );
        }

        let mut builder = preset.to_builder();
        builder.revision(self.game.revision());
        for &id in preset.effects() {
            if !self.game.effects().contains(id) {
                warn!("Ignoring unknown effect {} in preset", id);
                builder.remove_effect(id);
            }
        }

        debug!(
            "Applied preset with seed {:?} ({} effects)",
            preset.seed(),
            preset.effects().len()
        );
        self.builder = builder;
        Ok(())
    }
}

fn random_seed() -> String {
    format!("{:x}", rand::random::<u64>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::testing::recording;
    use crate::game::Metadata;
    use crate::preset::GameId;

    const GAME: GameId = GameId::from_u128(0x1234);

    fn game() -> Arc<GameDefinition> {
        let counters = Arc::default();
        Arc::new(
            GameDefinition::builder(GAME, "Game")
                .metadata(Metadata {
                    revision: 2,
                    ..Metadata::default()
                })
                .executable("game.exe")
                .effects((1..=4).map(|n| recording(n, &counters).build().unwrap()))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_new_enables_everything_with_seed() {
        let config = GameConfiguration::new(game());
        let preset = config.preset();
        assert_eq!(preset.effects().len(), 4);
        assert_eq!(preset.revision(), 2);
        assert!(!preset.seed().is_empty());
        assert!(u64::from_str_radix(preset.seed(), 16).is_ok());
    }

    #[test]
    fn test_toggle_effects() {
        let mut config = GameConfiguration::new(game());
        config.set_effect_enabled(EffectId(2), false).unwrap();
        assert!(!config.is_effect_enabled(EffectId(2)));
        assert!(!config.preset().has_effect(EffectId(2)));

        config.set_effect_enabled(EffectId(2), true).unwrap();
        assert!(config.preset().has_effect(EffectId(2)));

        let result = config.set_effect_enabled(EffectId(99), true);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_generate_seed_replaces_seed() {
        let mut config = GameConfiguration::new(game());
        config.builder_mut().seed("fixed");
        let seed = config.generate_seed().to_string();
        assert_ne!(seed, "fixed");
        assert_eq!(config.preset().seed(), seed);
    }

    #[test]
    fn test_apply_preset_filters_unknown_effects() {
        let mut config = GameConfiguration::new(game());
        let mut builder = Preset::builder(GAME, 1);
        builder
            .seed("shared")
            .effect_chance(75.0)
            .add_effect(EffectId(1))
            .add_effect(EffectId(3))
            .add_effect(EffectId(42));
        config.apply_preset(&builder.build()).unwrap();

        let preset = config.preset();
        assert_eq!(preset.seed(), "shared");
        assert_eq!(preset.effect_chance(), 75.0);
        assert_eq!(preset.revision(), 2);
        assert_eq!(
            preset.effects().iter().copied().collect::<Vec<_>>(),
            vec![EffectId(1), EffectId(3)]
        );
    }

    #[test]
    fn test_apply_preset_for_other_game_fails() {
        let mut config = GameConfiguration::new(game());
        config.builder_mut().seed("mine");
        let other = Preset::builder(GameId::from_u128(0x9999), 2).build();

        let result = config.apply_preset(&other);
        assert!(matches!(result, Err(Error::PresetGameMismatch { .. })));
        assert_eq!(config.preset().seed(), "mine");
    }
}
