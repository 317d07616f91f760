use crate::domain::booking::{Booking, BookingStatus, PaymentStatus};
use crate::error::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct BookingRow<'a> {
    booking: &'a str,
    room: u32,
    owner: u32,
    check_in: NaiveDate,
    check_out: NaiveDate,
    nights: u32,
    guests: u8,
    total: Decimal,
    status: BookingStatus,
    payment_status: PaymentStatus,
    cancellation_reason: Option<&'a str>,
}

/// Writes the final state of labelled bookings as CSV.
pub struct BookingWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> BookingWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_bookings<'a>(
        &mut self,
        bookings: impl IntoIterator<Item = (&'a str, &'a Booking)>,
    ) -> Result<()> {
        for (label, booking) in bookings {
            self.writer.serialize(BookingRow {
                booking: label,
                room: booking.room.0,
                owner: booking.owner.0,
                check_in: booking.stay.check_in(),
                check_out: booking.stay.check_out(),
                nights: booking.nights(),
                guests: booking.guests,
                total: booking.total_amount.value().normalize(),
                status: booking.status,
                payment_status: booking.payment_status,
                cancellation_reason: booking.cancellation_reason.as_deref(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
