//! Plain-text rendering of messages: `HHMM <channel|from> <user> :::<content>:::`.

use chrono::TimeZone;
use hackmud_chat::Message;

/// Render in the local time zone.
pub fn format_message(message: &Message) -> String {
    format_message_in(message, &chrono::Local)
}

pub fn format_message_in<Tz>(message: &Message, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let stamp = message.time().with_timezone(tz).format("%H%M");
    let place = match message {
        Message::Channel(m) => m.channel.as_str(),
        Message::Tell(_) => "from",
    };
    format!(
        "{} {} {} :::{}:::",
        stamp,
        place,
        message.sender(),
        message.content()
    )
}
