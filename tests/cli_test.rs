use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

fn replay(script: &std::path::Path) -> Command {
    let mut cmd = Command::new(cargo_bin!("roomledger"));
    cmd.arg("replay")
        .arg(script)
        .arg("--users")
        .arg("tests/fixtures/users.csv")
        .arg("--rooms")
        .arg("tests/fixtures/rooms.csv")
        .arg("--today")
        .arg("2027-01-01")
        .env_remove("ROOMLEDGER_WEBHOOK_SECRET")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_cli_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    replay("tests/fixtures/scenario.csv".as_ref())
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "booking,room,owner,check_in,check_out,nights,guests,total,status,payment_status,cancellation_reason",
        ))
        .stdout(predicate::str::contains(
            "A,101,1,2027-01-10,2027-01-12,2,2,200,CANCELLED,REFUNDED,change of plans",
        ))
        .stdout(predicate::str::contains(
            "C,101,2,2027-01-12,2027-01-15,3,1,300,PENDING,PENDING,",
        ))
        .stdout(predicate::str::contains(
            "D,201,2,2027-01-10,2027-01-11,1,2,250,CONFIRMED,PAID,",
        ))
        // B overlaps A and never gets a row.
        .stdout(predicate::str::contains("\nB,").not())
        .stderr(predicate::str::contains("Error processing command 4"));

    Ok(())
}

#[test]
fn test_cli_reports_rejected_commands_and_continues() {
    let mut script = tempfile::NamedTempFile::new().unwrap();
    writeln!(script, "op,actor,booking,room,owner,check_in,check_out,guests,amount,reference,note").unwrap();
    writeln!(script, "book,3,X,101,,2027-01-10,2027-01-12,,,,").unwrap();
    writeln!(script, "book,1,Y,301,,2027-01-10,2027-01-12,,,,").unwrap();
    writeln!(script, "teleport,1,Y,,,,,,,,").unwrap();
    writeln!(script, "book,1,Z,201,,2027-01-10,2027-01-12,,,,").unwrap();
    writeln!(script, "confirm_mobile,1,Z,,,,,,,,").unwrap();
    writeln!(script, "cancel,2,Z,,,,,,,,not mine").unwrap();

    replay(script.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Z,201,1,2027-01-10,2027-01-12,2,1,500,PENDING,PENDING,",
        ))
        .stderr(predicate::str::contains("Account 3 is inactive"))
        .stderr(predicate::str::contains("Error processing command 2"))
        .stderr(predicate::str::contains("Error reading command 3"))
        .stderr(predicate::str::contains("Error processing command 5"))
        .stderr(predicate::str::contains("Forbidden"));
}

#[test]
fn test_cli_completes_elapsed_stays() {
    let mut script = tempfile::NamedTempFile::new().unwrap();
    writeln!(script, "op,actor,booking,room,owner,check_in,check_out,guests,amount,reference,note").unwrap();
    writeln!(script, "book,10,S,201,1,2027-01-02,2027-01-04,3,,,").unwrap();
    writeln!(script, "pay_mobile,1,S,,,,,,,+237690000001,orange").unwrap();
    writeln!(script, "confirm_mobile,20,S,,,,,,,,").unwrap();
    writeln!(script, "clock,,,,,2027-01-04,,,,,").unwrap();
    writeln!(script, "complete,,,,,,,,,,").unwrap();

    replay(script.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "S,201,1,2027-01-02,2027-01-04,2,3,500,COMPLETED,PAID,",
        ));
}

#[test]
fn test_cli_unpaid_mobile_money_gives_way_to_card() {
    let mut script = tempfile::NamedTempFile::new().unwrap();
    writeln!(script, "op,actor,booking,room,owner,check_in,check_out,guests,amount,reference,note").unwrap();
    writeln!(script, "book,1,R,101,,2027-01-10,2027-01-12,2,,,").unwrap();
    writeln!(script, "pay_mobile,1,R,,,,,,,+237650000001,mtn").unwrap();
    writeln!(script, "pay_card,1,R,,,,,,,pm_card,").unwrap();
    writeln!(script, "reject_mobile,10,R,,,,,,,,").unwrap();
    writeln!(script, "pay_card,1,R,,,,,,,pm_card,").unwrap();
    writeln!(script, "card_succeeded,,R,,,,,,,,").unwrap();
    writeln!(script, "book,2,E,201,,2027-01-20,2027-01-21,1,,,").unwrap();
    writeln!(script, "pay_mobile,2,E,,,,,,,+237690000002,orange").unwrap();
    writeln!(script, "clock,,,,,2027-01-03,,,,,").unwrap();
    writeln!(script, "expire,,,,,,,,,,").unwrap();

    replay(script.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "R,101,1,2027-01-10,2027-01-12,2,2,200,CONFIRMED,PAID,",
        ))
        .stdout(predicate::str::contains(
            "E,201,2,2027-01-20,2027-01-21,1,1,250,PENDING,FAILED,",
        ))
        .stderr(predicate::str::contains("Error processing command 3"))
        .stderr(predicate::str::contains("Error processing command 5").not());
}
