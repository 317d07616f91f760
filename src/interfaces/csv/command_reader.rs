use crate::domain::money::Amount;
use crate::domain::room::RoomId;
use crate::domain::user::UserId;
use crate::error::{BookingError, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    Book,
    PayCard,
    CardSucceeded,
    CardFailed,
    RefundSucceeded,
    PayMobile,
    ConfirmMobile,
    RejectMobile,
    Cancel,
    Refund,
    SetPrice,
    Clock,
    Complete,
    Expire,
}

/// One row of a replay script. Which columns are required depends on `op`.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct CommandRecord {
    pub op: CommandType,
    pub actor: Option<u32>,
    pub booking: Option<String>,
    pub room: Option<u32>,
    pub owner: Option<u32>,
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    pub guests: Option<u8>,
    pub amount: Option<Amount>,
    pub reference: Option<String>,
    pub note: Option<String>,
}

/// A validated script step. Bookings are named by the label the script
/// gave them in their `book` row.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Book {
        actor: UserId,
        label: String,
        room: RoomId,
        owner: Option<UserId>,
        check_in: NaiveDate,
        check_out: NaiveDate,
        guests: u8,
        special_requests: Option<String>,
    },
    PayCard {
        actor: UserId,
        label: String,
        instrument: String,
    },
    /// Gateway reports the card capture; `amount` overrides the charged amount.
    CardSucceeded {
        label: String,
        amount: Option<Amount>,
    },
    CardFailed {
        label: String,
    },
    RefundSucceeded {
        label: String,
        amount: Option<Amount>,
    },
    PayMobile {
        actor: UserId,
        label: String,
        phone_number: String,
        operator: String,
    },
    ConfirmMobile {
        actor: UserId,
        label: String,
    },
    RejectMobile {
        actor: UserId,
        label: String,
    },
    Cancel {
        actor: UserId,
        label: String,
        reason: String,
    },
    Refund {
        actor: UserId,
        label: String,
        amount: Option<Amount>,
        reference: Option<String>,
    },
    SetPrice {
        actor: UserId,
        room: RoomId,
        price: Amount,
    },
    Clock {
        today: NaiveDate,
    },
    Complete,
    /// Fails payment attempts that stayed PENDING past the expiry.
    Expire,
}

impl TryFrom<CommandRecord> for Command {
    type Error = BookingError;

    fn try_from(record: CommandRecord) -> Result<Self> {
        let actor = || record.actor.map(UserId).ok_or_else(|| missing(record.op, "actor"));
        let label = || record.booking.clone().ok_or_else(|| missing(record.op, "booking"));

        Ok(match record.op {
            CommandType::Book => Command::Book {
                actor: actor()?,
                label: label()?,
                room: record.room.map(RoomId).ok_or_else(|| missing(record.op, "room"))?,
                owner: record.owner.map(UserId),
                check_in: record.check_in.ok_or_else(|| missing(record.op, "check_in"))?,
                check_out: record.check_out.ok_or_else(|| missing(record.op, "check_out"))?,
                guests: record.guests.unwrap_or(1),
                special_requests: record.note.clone(),
            },
            CommandType::PayCard => Command::PayCard {
                actor: actor()?,
                label: label()?,
                instrument: record.reference.clone().unwrap_or_else(|| "pm_card".to_string()),
            },
            CommandType::CardSucceeded => Command::CardSucceeded {
                label: label()?,
                amount: record.amount,
            },
            CommandType::CardFailed => Command::CardFailed { label: label()? },
            CommandType::RefundSucceeded => Command::RefundSucceeded {
                label: label()?,
                amount: record.amount,
            },
            CommandType::PayMobile => Command::PayMobile {
                actor: actor()?,
                label: label()?,
                phone_number: record
                    .reference
                    .clone()
                    .ok_or_else(|| missing(record.op, "reference (phone number)"))?,
                operator: record
                    .note
                    .clone()
                    .ok_or_else(|| missing(record.op, "note (operator)"))?,
            },
            CommandType::ConfirmMobile => Command::ConfirmMobile {
                actor: actor()?,
                label: label()?,
            },
            CommandType::RejectMobile => Command::RejectMobile {
                actor: actor()?,
                label: label()?,
            },
            CommandType::Cancel => Command::Cancel {
                actor: actor()?,
                label: label()?,
                reason: record.note.clone().unwrap_or_default(),
            },
            CommandType::Refund => Command::Refund {
                actor: actor()?,
                label: label()?,
                amount: record.amount,
                reference: record.reference.clone(),
            },
            CommandType::SetPrice => Command::SetPrice {
                actor: actor()?,
                room: record.room.map(RoomId).ok_or_else(|| missing(record.op, "room"))?,
                price: record.amount.ok_or_else(|| missing(record.op, "amount"))?,
            },
            CommandType::Clock => Command::Clock {
                today: record.check_in.ok_or_else(|| missing(record.op, "check_in"))?,
            },
            CommandType::Complete => Command::Complete,
            CommandType::Expire => Command::Expire,
        })
    }
}

fn missing(op: CommandType, column: &str) -> BookingError {
    BookingError::ValidationError(format!("{op:?} row is missing {column}"))
}

/// Streams replay commands from a CSV script.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.reader
            .into_deserialize::<CommandRecord>()
            .map(|result| result.map_err(BookingError::from).and_then(Command::try_from))
    }
}
