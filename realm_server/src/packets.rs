//! Outbound packet builders.
//!
//! Each builder returns an unframed [`Packet`]; framing and keystream
//! obfuscation happen when the packet is handed to the player's outbox.

use realm_shared::{
    cursor::WriteCursor,
    net::{outbound, Packet, PacketHeader},
    position::{Position, MAX_COORDINATE},
};

use crate::item::Item;

pub fn chatbox_message(text: &str) -> Packet {
    let mut buf = WriteCursor::with_capacity(text.len() + 1);
    buf.put_str(text);
    Packet::new(outbound::CHATBOX_MESSAGE, PacketHeader::VariableByte, buf)
}

pub fn client_config(index: u16, state: u8) -> Packet {
    let mut buf = WriteCursor::with_capacity(3);
    buf.put_u16_le(index).put_u8(state);
    Packet::fixed(outbound::CLIENT_CONFIG, buf)
}

/// Places `interface` in sidebar tab `tab`.
pub fn sidebar_widget(tab: u8, interface: u16) -> Packet {
    let mut buf = WriteCursor::with_capacity(3);
    buf.put_u16(interface).put_u8_a(tab);
    Packet::fixed(outbound::SIDEBAR_WIDGET, buf)
}

pub fn login_details(member: bool, index: u16) -> Packet {
    let mut buf = WriteCursor::with_capacity(3);
    buf.put_u8_a(u8::from(member)).put_u16_le_a(index);
    Packet::fixed(outbound::LOGIN_DETAILS, buf)
}

pub fn skill(skill: u8, experience: u32, level: u8) -> Packet {
    let mut buf = WriteCursor::with_capacity(6);
    buf.put_u8(skill).put_u32_me(experience).put_u8(level);
    Packet::fixed(outbound::SKILL, buf)
}

pub fn run_energy(energy: u8) -> Packet {
    let mut buf = WriteCursor::with_capacity(1);
    buf.put_u8(energy);
    Packet::fixed(outbound::RUN_ENERGY, buf)
}

/// Tells the client to load the map around `region`. Segments off the map
/// are clamped to its edge.
pub fn construct_region(region: &Position) -> Packet {
    let segment = |s: i32| s.clamp(0, MAX_COORDINATE >> 3) as u16;
    let mut buf = WriteCursor::with_capacity(4);
    buf.put_u16_a(segment(region.segment_x()))
        .put_u16(segment(region.segment_y()));
    Packet::fixed(outbound::CONSTRUCT_REGION, buf)
}

/// Fills the item slots of `interface`, one entry per slot.
pub fn item_interface(interface: u16, items: &[Option<Item>]) -> Packet {
    let mut buf = WriteCursor::with_capacity(4 + items.len() * 7);
    buf.put_u16(interface).put_u16(items.len() as u16);
    for item in items {
        match item {
            Some(item) => {
                if item.amount >= 255 {
                    buf.put_u8(255).put_u32(item.amount);
                } else {
                    buf.put_u8(item.amount as u8);
                }
                buf.put_u16_le_a(item.id.wrapping_add(1));
            }
            None => {
                buf.put_u8(0).put_u16_le_a(0);
            }
        }
    }
    Packet::new(outbound::ITEM_INTERFACE, PacketHeader::VariableShort, buf)
}

/// Shows the model of `item` on `interface`.
pub fn item_on_interface(interface: u16, zoom: u16, item: u16) -> Packet {
    let mut buf = WriteCursor::with_capacity(6);
    buf.put_u16_le(interface).put_u16(zoom).put_u16(item);
    Packet::fixed(outbound::ITEM_ON_INTERFACE, buf)
}

pub fn interface_text(text: &str, interface: u16) -> Packet {
    let mut buf = WriteCursor::with_capacity(text.len() + 3);
    buf.put_str(text).put_u16_a(interface);
    Packet::new(outbound::INTERFACE_TEXT, PacketHeader::VariableShort, buf)
}

pub fn logout() -> Packet {
    Packet::empty(outbound::LOGOUT)
}
