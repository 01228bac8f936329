//! Profile file format
//!
//! ```xml
//! <settings>
//!   <setting channel="1" controller="7" command_string="ChangeCurrentSlider"/>
//!   <setting channel="1" note="36" command_string="Pick"/>
//!   <setting channel="2" pitchbend="0" command_string="Exposure"/>
//! </settings>
//! ```
//!
//! Channels are written 1-16. Elements that carry none of `controller`, `note`
//! or `pitchbend`, or whose numbers do not parse, are skipped on read.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use tracing::{debug, warn};

use super::{Binding, ControlId, ControlKind};
use crate::error::{BridgeError, Result};
use crate::midi::{CHANNELS, MAX_NRPN};

const ROOT: &str = "settings";
const SETTING: &str = "setting";

/// Serialize bindings as a `<settings>` document
pub fn write_bindings(bindings: &[Binding]) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_err)?;
    writer
        .write_event(Event::Start(BytesStart::new(ROOT)))
        .map_err(xml_err)?;

    for binding in bindings {
        let id = binding.control;
        let channel = (id.channel + 1).to_string();
        let number = id.number.to_string();
        let mut setting = BytesStart::new(SETTING);
        setting.push_attribute(("channel", channel.as_str()));
        match id.kind {
            ControlKind::ControlChange => setting.push_attribute(("controller", number.as_str())),
            ControlKind::Note => setting.push_attribute(("note", number.as_str())),
            ControlKind::PitchBend => setting.push_attribute(("pitchbend", "0")),
        }
        setting.push_attribute(("command_string", binding.command.as_str()));
        writer.write_event(Event::Empty(setting)).map_err(xml_err)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new(ROOT)))
        .map_err(xml_err)?;

    String::from_utf8(writer.into_inner()).map_err(xml_err)
}

fn xml_err(e: impl std::fmt::Display) -> BridgeError {
    BridgeError::Xml(e.to_string())
}

/// Parse a `<settings>` document, skipping anything unrecognized
///
/// A document whose root is not `<settings>` yields no bindings. A parse
/// error stops reading; bindings read before it are kept.
pub fn parse_bindings(xml: &str) -> Vec<Binding> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut bindings = Vec::new();
    let mut seen_root = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = e.name();
                if !seen_root {
                    if name.as_ref() != ROOT.as_bytes() {
                        warn!("Profile root is not <{}>, nothing imported", ROOT);
                        return bindings;
                    }
                    seen_root = true;
                } else if name.as_ref() == SETTING.as_bytes() {
                    match parse_setting(&e) {
                        Some(binding) => bindings.push(binding),
                        None => debug!("Skipping unrecognized profile entry"),
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(
                    "Profile XML error at position {}: {}",
                    reader.buffer_position(),
                    e
                );
                break;
            }
        }
    }
    bindings
}

fn parse_setting(element: &BytesStart<'_>) -> Option<Binding> {
    let mut channel = None;
    let mut controller = None;
    let mut note = None;
    let mut pitchbend = false;
    let mut command = None;

    for attr in element.attributes().flatten() {
        let value = attr.unescape_value().ok()?;
        match attr.key.as_ref() {
            b"channel" => channel = value.trim().parse::<u8>().ok(),
            b"controller" => controller = value.trim().parse::<u16>().ok(),
            b"note" => note = value.trim().parse::<u16>().ok(),
            b"pitchbend" => pitchbend = true,
            b"command_string" => command = Some(value.into_owned()),
            _ => {}
        }
    }

    let channel = channel.filter(|c| (1..=CHANNELS as u8).contains(c))? - 1;
    let command = command?;
    let control = if let Some(number) = controller {
        ControlId::control_change(channel, number)
    } else if let Some(number) = note {
        ControlId::note(channel, number)
    } else if pitchbend {
        ControlId::pitch_bend(channel)
    } else {
        return None;
    };
    if control.number > MAX_NRPN {
        return None;
    }
    Some(Binding { control, command })
}
