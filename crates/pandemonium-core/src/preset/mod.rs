//! Shareable race configuration.
//!
//! A [`Preset`] captures everything two racers need to get the same effect
//! sequence: the game, the seed, the chances and timing ranges, and the set of
//! enabled effects. It travels as a Base64 token.
//!
//! ## Wire format (version 1)
//!
//! | Field                | Encoding                          |
//! |----------------------|-----------------------------------|
//! | version              | varint u32                        |
//! | game id high, low    | zigzag varint i64, twice          |
//! | revision             | varint u32                        |
//! | seed                 | varint length + UTF-8             |
//! | chances and ranges   | six zigzag varint i32, 1/32 units |
//! | effect ids           | varint count + varint u32 each    |

mod buffer;
mod game_id;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

pub use buffer::{
    PresetBuffer, QUANTIZATION_SCALE, dequantize, quantize, zigzag_decode_32, zigzag_decode_64,
    zigzag_encode_32, zigzag_encode_64,
};
pub use game_id::GameId;

use crate::effect::EffectId;
use crate::error::{Error, Result};

/// Current wire format version.
pub const PRESET_VERSION: u32 = 1;

pub mod defaults {
    //! Builder defaults for a fresh preset.

    /// Percent chance that a spawn tick schedules anything
    pub const EFFECT_CHANCE: f64 = 50.0;
    /// Percent chance to stack onto already active effects
    pub const COMBINATION_CHANCE: f64 = 0.0;
    /// Delay range in seconds
    pub const DELAY_LOW: f64 = 0.0;
    pub const DELAY_HIGH: f64 = 300.0;
    /// Duration range in seconds
    pub const DURATION_LOW: f64 = 0.0;
    pub const DURATION_HIGH: f64 = 300.0;
}

/// Immutable race configuration. Build one with [`PresetBuilder`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preset {
    version: u32,
    game_id: GameId,
    revision: u32,
    seed: String,
    effect_chance: f64,
    combination_chance: f64,
    delay_low: f64,
    delay_high: f64,
    duration_low: f64,
    duration_high: f64,
    effects: BTreeSet<EffectId>,
}

impl Preset {
    pub fn builder(game_id: GameId, revision: u32) -> PresetBuilder {
        PresetBuilder::new(game_id, revision)
    }

    /// A builder pre-filled with this preset's values.
    pub fn to_builder(&self) -> PresetBuilder {
        PresetBuilder {
            game_id: self.game_id,
            revision: self.revision,
            seed: self.seed.clone(),
            effect_chance: self.effect_chance,
            combination_chance: self.combination_chance,
            delay_low: self.delay_low,
            delay_high: self.delay_high,
            duration_low: self.duration_low,
            duration_high: self.duration_high,
            effects: self.effects.clone(),
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    /// Revision of the game definition the preset was made for.
    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }

    /// Percent chance that a spawn tick schedules an effect.
    pub fn effect_chance(&self) -> f64 {
        self.effect_chance
    }

    /// Percent chance that a spawn tick adds to already active effects.
    pub fn combination_chance(&self) -> f64 {
        self.combination_chance
    }

    /// Delay range in seconds.
    pub fn delay_range(&self) -> (f64, f64) {
        (self.delay_low, self.delay_high)
    }

    /// Duration range in seconds.
    pub fn duration_range(&self) -> (f64, f64) {
        (self.duration_low, self.duration_high)
    }

    pub fn effects(&self) -> &BTreeSet<EffectId> {
        &self.effects
    }

    pub fn has_effect(&self, id: EffectId) -> bool {
        self.effects.contains(&id)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = PresetBuffer::new();
        self.write(&mut buffer);
        buffer.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Self::read(&mut PresetBuffer::from_bytes(bytes.to_vec()))
    }

    /// Base64 token.
    pub fn to_text(&self) -> String {
        let mut buffer = PresetBuffer::new();
        self.write(&mut buffer);
        buffer.to_base64()
    }

    pub fn from_text(text: &str) -> Result<Self> {
        Self::read(&mut PresetBuffer::from_base64(text)?)
    }

    fn write(&self, buffer: &mut PresetBuffer) {
        buffer.write_u32(self.version);
        buffer.write_i64(self.game_id.high());
        buffer.write_i64(self.game_id.low());
        buffer.write_u32(self.revision);
        buffer.write_string(&self.seed);
        buffer.write_quantized(self.effect_chance);
        buffer.write_quantized(self.combination_chance);
        buffer.write_quantized(self.delay_low);
        buffer.write_quantized(self.delay_high);
        buffer.write_quantized(self.duration_low);
        buffer.write_quantized(self.duration_high);
        buffer.write_u32_set(self.effects.iter().map(|id| id.0));
    }

    fn read(buffer: &mut PresetBuffer) -> Result<Self> {
        let version = buffer.read_u32("version")?;
        if version != PRESET_VERSION {
            return Err(Error::PresetVersionMismatch {
                expected: PRESET_VERSION,
                actual: version,
            });
        }

        let high = buffer.read_i64("game id")?;
        let low = buffer.read_i64("game id")?;

        Ok(Self {
            version,
            game_id: GameId::from_parts(high, low),
            revision: buffer.read_u32("revision")?,
            seed: buffer.read_string("seed")?,
            effect_chance: buffer.read_quantized("effect chance")?,
            combination_chance: buffer.read_quantized("combination chance")?,
            delay_low: buffer.read_quantized("delay range")?,
            delay_high: buffer.read_quantized("delay range")?,
            duration_low: buffer.read_quantized("duration range")?,
            duration_high: buffer.read_quantized("duration range")?,
            effects: buffer
                .read_u32_set("effect ids")?
                .into_iter()
                .map(EffectId)
                .collect(),
        })
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl FromStr for Preset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_text(s)
    }
}

/// Mutable companion of [`Preset`].
///
/// `build()` snapshots the current values; the builder stays usable.
#[derive(Debug, Clone)]
pub struct PresetBuilder {
    game_id: GameId,
    revision: u32,
    seed: String,
    effect_chance: f64,
    combination_chance: f64,
    delay_low: f64,
    delay_high: f64,
    duration_low: f64,
    duration_high: f64,
    effects: BTreeSet<EffectId>,
}

impl PresetBuilder {
    pub fn new(game_id: GameId, revision: u32) -> Self {
        Self {
            game_id,
            revision,
            seed: String::new(),
            effect_chance: defaults::EFFECT_CHANCE,
            combination_chance: defaults::COMBINATION_CHANCE,
            delay_low: defaults::DELAY_LOW,
            delay_high: defaults::DELAY_HIGH,
            duration_low: defaults::DURATION_LOW,
            duration_high: defaults::DURATION_HIGH,
            effects: BTreeSet::new(),
        }
    }

    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    pub fn current_seed(&self) -> &str {
        &self.seed
    }

    pub fn seed(&mut self, seed: impl Into<String>) -> &mut Self {
        self.seed = seed.into();
        self
    }

    pub fn revision(&mut self, revision: u32) -> &mut Self {
        self.revision = revision;
        self
    }

    pub fn effect_chance(&mut self, percent: f64) -> &mut Self {
        self.effect_chance = percent;
        self
    }

    pub fn combination_chance(&mut self, percent: f64) -> &mut Self {
        self.combination_chance = percent;
        self
    }

    /// Delay range in seconds.
    pub fn delay(&mut self, low: f64, high: f64) -> &mut Self {
        self.delay_low = low;
        self.delay_high = high;
        self
    }

    /// Duration range in seconds.
    pub fn duration(&mut self, low: f64, high: f64) -> &mut Self {
        self.duration_low = low;
        self.duration_high = high;
        self
    }

    pub fn add_effect(&mut self, id: EffectId) -> &mut Self {
        self.effects.insert(id);
        self
    }

    pub fn remove_effect(&mut self, id: EffectId) -> &mut Self {
        self.effects.remove(&id);
        self
    }

    pub fn clear_effects(&mut self) -> &mut Self {
        self.effects.clear();
        self
    }

    pub fn has_effect(&self, id: EffectId) -> bool {
        self.effects.contains(&id)
    }

    /// Freeze the current values. Reals are quantized the same way the wire
    /// format stores them, so a preset survives encoding unchanged.
    pub fn build(&self) -> Preset {
        let q = |value: f64| dequantize(quantize(value));
        Preset {
            version: PRESET_VERSION,
            game_id: self.game_id,
            revision: self.revision,
            seed: self.seed.clone(),
            effect_chance: q(self.effect_chance),
            combination_chance: q(self.combination_chance),
            delay_low: q(self.delay_low),
            delay_high: q(self.delay_high),
            duration_low: q(self.duration_low),
            duration_high: q(self.duration_high),
            effects: self.effects.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GAME: GameId = GameId::from_parts(0x0726_FFC3_4129_4293, 0x2C07_F5C7_2C6D_F878);

    fn sample() -> Preset {
        let mut builder = Preset::builder(GAME, 3);
        builder
            .seed("abc")
            .effect_chance(50.0)
            .combination_chance(0.0)
            .delay(0.0, 300.0)
            .duration(0.0, 300.0)
            .add_effect(EffectId(1))
            .add_effect(EffectId(2))
            .add_effect(EffectId(3));
        builder.build()
    }

    #[test]
    fn test_builder_defaults() {
        let preset = Preset::builder(GAME, 0).build();
        assert_eq!(preset.seed(), "");
        assert_eq!(preset.effect_chance(), 50.0);
        assert_eq!(preset.combination_chance(), 0.0);
        assert_eq!(preset.delay_range(), (0.0, 300.0));
        assert_eq!(preset.duration_range(), (0.0, 300.0));
        assert!(preset.effects().is_empty());
        assert_eq!(preset.version(), PRESET_VERSION);
    }

    #[test]
    fn test_round_trip() {
        let preset = sample();
        let decoded = Preset::decode(&preset.encode()).unwrap();

        assert_eq!(decoded.game_id(), GAME);
        assert_eq!(decoded.revision(), 3);
        assert_eq!(decoded.seed(), "abc");
        assert_eq!(
            decoded.effects().iter().map(|id| id.0).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!((decoded.effect_chance() - 50.0).abs() < 1.0 / 32.0);
        assert!((decoded.delay_range().1 - 300.0).abs() < 1.0 / 32.0);
        assert_eq!(decoded, preset);
    }

    #[test]
    fn test_text_round_trip() {
        let preset = sample();
        let text = preset.to_string();
        assert_eq!(text.parse::<Preset>().unwrap(), preset);
        // Surrounding whitespace from chat clients is tolerated
        assert_eq!(Preset::from_text(&format!("  {}\n", text)).unwrap(), preset);
    }

    #[test]
    fn test_fractional_values_are_quantized_on_build() {
        let mut builder = Preset::builder(GAME, 0);
        builder.effect_chance(33.333).delay(1.01, 2.99);
        let preset = builder.build();

        assert_eq!(preset.effect_chance(), 33.3125);
        assert_eq!(preset.delay_range(), (1.0, 2.96875));
        assert_eq!(Preset::decode(&preset.encode()).unwrap(), preset);
    }

    #[test]
    fn test_version_mismatch() {
        let mut bytes = sample().encode();
        bytes[0] = 2;

        match Preset::decode(&bytes) {
            Err(Error::PresetVersionMismatch { expected, actual }) => {
                assert_eq!(expected, 1);
                assert_eq!(actual, 2);
            }
            other => panic!("expected version mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_truncation_at_every_length() {
        let bytes = sample().encode();
        for len in 0..bytes.len() {
            let err = Preset::decode(&bytes[..len]).unwrap_err();
            assert!(
                matches!(err, Error::PresetTruncated(_)),
                "length {} gave {:?}",
                len,
                err
            );
        }
    }

    #[test]
    fn test_malformed_text() {
        assert!(matches!(
            Preset::from_text("%%%"),
            Err(Error::MalformedPresetText(_))
        ));
    }

    #[test]
    fn test_builder_membership_and_copy() {
        let preset = sample();
        let mut builder = preset.to_builder();
        builder.remove_effect(EffectId(2)).add_effect(EffectId(9));
        assert!(!builder.has_effect(EffectId(2)));

        let changed = builder.build();
        assert!(changed.has_effect(EffectId(9)));
        assert!(!changed.has_effect(EffectId(2)));
        // The source preset is unaffected
        assert!(preset.has_effect(EffectId(2)));
    }

    #[test]
    fn test_build_snapshots() {
        let mut builder = Preset::builder(GAME, 0);
        builder.seed("first");
        let first = builder.build();
        builder.seed("second");
        assert_eq!(first.seed(), "first");
        assert_eq!(builder.build().seed(), "second");
    }

    #[test]
    fn test_negative_game_id_halves() {
        let id = GameId::from_parts(-1, i64::MIN);
        let preset = Preset::builder(id, 0).build();
        assert_eq!(Preset::decode(&preset.encode()).unwrap().game_id(), id);
    }
}
