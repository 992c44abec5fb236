use std::path::Path;

use apt_link::{commands, Address, CommandFrame, MAX_SLOTS};

use crate::resolver::{self, Collideable};
use crate::serializer::{attr_u16, opt_attr_u16};
use crate::{
    open_xml, Compile, ConfigError, ConfigNode, FlipperShutterGroup, Persistable, Result,
    StageParameters,
};

/// Per-slot parameters declared inside a card's `CustomConfig`.
#[derive(Clone, Debug, PartialEq)]
pub enum CustomConfig {
    Stage(StageParameters),
    Flipper(FlipperShutterGroup),
}

impl CustomConfig {
    fn from_node(node: &ConfigNode, slot: u16) -> Result<Self> {
        let [inner] = node.children() else {
            return Err(ConfigError::structure(
                node,
                "CustomConfig must have exactly one child",
            ));
        };
        match inner.name() {
            "StageParameters" => Ok(CustomConfig::Stage(StageParameters::from_node(inner, slot)?)),
            "FlipperShutterParameters" => Ok(CustomConfig::Flipper(FlipperShutterGroup::from_node(
                inner, slot,
            )?)),
            other => Err(ConfigError::unsupported(node, "custom config", other)),
        }
    }

    pub fn slot(&self) -> u16 {
        match self {
            CustomConfig::Stage(s) => s.slot(),
            CustomConfig::Flipper(f) => f.slot(),
        }
    }

    pub fn compile_persistent(&self, persist: bool) -> Result<Vec<CommandFrame>> {
        match self {
            CustomConfig::Stage(s) => s.compile_persistent(persist),
            CustomConfig::Flipper(f) => f.compile_persistent(persist),
        }
    }
}

/// A card declared in a slot.
#[derive(Clone, Debug, PartialEq)]
pub struct Card {
    /// 1-based slot number.
    pub slot: u16,
    pub card_type: u16,
    pub is_static: bool,
    pub device_detect: bool,
    pub custom: Option<CustomConfig>,
}

impl Card {
    pub fn new(slot: u16, card_type: u16) -> Self {
        Self {
            slot,
            card_type,
            is_static: false,
            device_detect: true,
            custom: None,
        }
    }

    fn from_node(node: &ConfigNode, next_slot: &mut u16) -> Result<Self> {
        let slot = match opt_attr_u16(node, "slot")? {
            Some(slot) => slot,
            None => *next_slot,
        };
        if Address::slot(slot).is_none() {
            return Err(ConfigError::malformed(node, "slot", slot.to_string()));
        }
        *next_slot = slot.saturating_add(1);

        let mut card = Card::new(slot, attr_u16(node, "type")?);
        card.is_static = node.attr("static") == Some("1");
        card.device_detect = node
            .attr("device-detect")
            .map_or(true, |v| v.eq_ignore_ascii_case("true"));
        for custom in node.children_named("CustomConfig") {
            card.custom = Some(CustomConfig::from_node(custom, slot)?);
        }
        Ok(card)
    }

    /// Card-type word as sent to the controller, static flag in bit 15.
    pub fn type_word(&self) -> u16 {
        if self.is_static {
            self.card_type | 0x8000
        } else {
            self.card_type
        }
    }

    fn slot_index(&self) -> u16 {
        self.slot - 1
    }

    fn type_frame(&self) -> Result<CommandFrame> {
        let mut payload = Vec::with_capacity(4);
        payload.extend_from_slice(&self.slot_index().to_le_bytes());
        payload.extend_from_slice(&self.type_word().to_le_bytes());
        Ok(CommandFrame::long(
            commands::SET_CARD_TYPE,
            Address::Motherboard,
            payload,
        )?)
    }

    fn detection_frame(&self) -> Result<CommandFrame> {
        let [index, _] = self.slot_index().to_le_bytes();
        Ok(CommandFrame::long(
            commands::MCM_SET_DEVICE_DETECTION,
            Address::Motherboard,
            vec![index, 0, u8::from(self.device_detect)],
        )?)
    }
}

impl Collideable for Card {
    fn collides_with(&self, other: &Self) -> bool {
        self.slot == other.slot
    }
}

/// The `Settings` element: the cards fitted to the chassis.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Settings {
    cards: Vec<Card>,
}

impl Settings {
    /// Read a stand-alone settings file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_node(&open_xml(path)?)
    }

    pub fn from_node(node: &ConfigNode) -> Result<Self> {
        let mut next_slot = 1;
        let cards = node
            .children_named("Card")
            .map(|c| Card::from_node(c, &mut next_slot))
            .collect::<Result<Vec<_>>>()?;
        let cards = resolver::unique(cards)
            .map_err(|c| ConfigError::collision(node, "card slot", c))?;
        Ok(Self { cards })
    }

    pub fn from_cards(cards: Vec<Card>) -> Self {
        Self { cards }
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    /// Distinct card types in declaration order.
    pub fn cards_in_use(&self) -> Vec<u16> {
        let mut types = Vec::new();
        for card in &self.cards {
            if !types.contains(&card.card_type) {
                types.push(card.card_type);
            }
        }
        types
    }

    pub fn custom_configs(&self) -> impl Iterator<Item = &CustomConfig> {
        self.cards.iter().filter_map(|c| c.custom.as_ref())
    }

    fn check_slots(&self) -> Result<()> {
        match self.cards.iter().find(|c| c.slot == 0 || c.slot > u16::from(MAX_SLOTS)) {
            Some(card) => Err(ConfigError::MalformedValue {
                node: "/Settings/Card".to_string(),
                field: "slot".to_string(),
                value: card.slot.to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl Compile for Settings {
    /// All card-type frames, then all device-detection frames.
    fn compile(&self) -> Result<Vec<CommandFrame>> {
        self.check_slots()?;
        let mut frames = Vec::with_capacity(self.cards.len() * 2);
        for card in &self.cards {
            frames.push(card.type_frame()?);
        }
        for card in &self.cards {
            frames.push(card.detection_frame()?);
        }
        Ok(frames)
    }
}
