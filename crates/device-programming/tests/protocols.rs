use std::time::Duration;

use apt_link::{commands, Address, CommandFrame, MockLink, SharedLink};
use device_programming::{
    CancelToken, LutImage, LutProgrammer, LutState, OneWireProgrammer, OneWireState, ProgramError,
};

fn short_reply(command: u16, table: u8, status: u8) -> CommandFrame {
    CommandFrame::short(command, Address::Host, table, status)
}

fn word_reply(command: u16, table: u8, value: u32) -> anyhow::Result<CommandFrame> {
    let mut payload = vec![table];
    payload.extend_from_slice(&value.to_le_bytes());
    Ok(CommandFrame::long(command, Address::Host, payload)?)
}

fn ow_reply(status: u8) -> anyhow::Result<CommandFrame> {
    Ok(CommandFrame::long(
        commands::OW_GET_PROGRAMMING,
        Address::Host,
        vec![0, 0, status],
    )?)
}

fn ow_size(max: u16) -> anyhow::Result<CommandFrame> {
    Ok(CommandFrame::long(
        commands::OW_GET_PROGRAMMING_SIZE,
        Address::Host,
        max.to_le_bytes().to_vec(),
    )?)
}

#[test]
fn lut_rejected_inquiry_cancels_once() -> anyhow::Result<()> {
    let mut link = MockLink::default();
    link.push_reply_frame(&short_reply(commands::LUT_GET_INQUIRY, 5, 1));

    let mut lut = LutProgrammer::new(&mut link);
    let image = LutImage {
        table: 5,
        inquiry: &[1, 2, 3],
        payload: &[4, 5, 6],
    };
    let err = lut.program(&image).unwrap_err();
    assert!(matches!(err, ProgramError::ProtocolStatus { step: 1, status: 1, .. }));
    assert_eq!(lut.state(), LutState::Idle);

    let frames = link.sent_frames()?;
    let cancels: Vec<_> = frames
        .iter()
        .filter(|f| f.command_id == commands::LUT_SET_INQUIRY && f.params() == Some((5, 0)))
        .collect();
    assert_eq!(cancels.len(), 1);
    assert!(frames
        .iter()
        .all(|f| f.command_id != commands::LUT_SET_PROGRAMMING));
    Ok(())
}

#[test]
fn lut_streams_inquiry_then_inquiry_and_payload() -> anyhow::Result<()> {
    let mut link = MockLink::default();
    link.push_reply_frame(&short_reply(commands::LUT_GET_INQUIRY, 2, 0));
    link.push_reply_frame(&word_reply(commands::LUT_GET_PROGRAMMING_SIZE, 2, 4)?);
    // inquiry: 6 bytes in 2 chunks
    link.push_reply_frame(&short_reply(commands::LUT_INQUIRE_RES, 2, 12));
    link.push_reply_frame(&short_reply(commands::LUT_INQUIRE_RES, 2, 0));
    link.push_reply_frame(&short_reply(commands::LUT_RES_PROGRAMMING, 2, 0));
    // inquiry + payload: 10 bytes in 3 chunks
    for _ in 0..3 {
        link.push_reply_frame(&short_reply(commands::LUT_PROGRAM_RES, 2, 0));
    }
    link.push_reply_frame(&word_reply(commands::LUT_FINISH_PROGRAMMING_RES, 2, u32::MAX)?);

    let inquiry = [10, 11, 12, 13, 14, 15];
    let payload = [20, 21, 22, 23];
    let mut lut = LutProgrammer::new(&mut link).with_timeout(Duration::from_millis(50));
    lut.program(&LutImage {
        table: 2,
        inquiry: &inquiry,
        payload: &payload,
    })?;
    assert_eq!(lut.state(), LutState::Finished);

    let frames = link.sent_frames()?;
    let ids: Vec<u16> = frames.iter().map(|f| f.command_id).collect();
    assert_eq!(
        ids,
        vec![
            commands::LUT_SET_INQUIRY,
            commands::LUT_REQ_PROGRAMMING_SIZE,
            commands::LUT_INQUIRE,
            commands::LUT_INQUIRE,
            commands::LUT_SET_PROGRAMMING,
            commands::LUT_PROGRAM,
            commands::LUT_PROGRAM,
            commands::LUT_PROGRAM,
            commands::LUT_FINISH_PROGRAMMING,
        ]
    );
    assert_eq!(frames[0].params(), Some((2, 1)));
    assert_eq!(frames[3].payload(), &[2, 14, 15]);
    assert_eq!(frames[5].payload(), &[2, 10, 11, 12, 13]);
    assert_eq!(frames[7].payload(), &[2, 22, 23]);
    assert_eq!(link.pending_replies(), 0);
    Ok(())
}

#[test]
fn lut_timeout_while_programming_cancels_programming() -> anyhow::Result<()> {
    let mut link = MockLink::default();
    link.push_reply_frame(&short_reply(commands::LUT_GET_INQUIRY, 3, 0));
    link.push_reply_frame(&word_reply(commands::LUT_GET_PROGRAMMING_SIZE, 3, 64)?);
    link.push_reply_frame(&short_reply(commands::LUT_RES_PROGRAMMING, 3, 0));
    link.push_silence();

    let mut lut = LutProgrammer::new(&mut link);
    let err = lut
        .program(&LutImage {
            table: 3,
            inquiry: &[],
            payload: &[1, 2],
        })
        .unwrap_err();
    assert!(matches!(err, ProgramError::ProtocolTimeout { step: 5 }));

    let last = link.sent_frames()?.pop();
    assert_eq!(
        last,
        Some(CommandFrame::short(commands::LUT_SET_PROGRAMMING, Address::Motherboard, 3, 0))
    );
    Ok(())
}

#[test]
fn one_wire_chunk_failure_stops_the_stream() -> anyhow::Result<()> {
    let mut link = MockLink::default();
    link.push_reply_frame(&ow_reply(0)?);
    link.push_reply_frame(&ow_size(2)?);
    link.push_reply_frame(&ow_reply(0)?);
    link.push_reply_frame(&ow_reply(0)?);
    link.push_reply_frame(&ow_reply(5)?);
    // answer to the first disable attempt
    link.push_reply_frame(&ow_reply(0)?);

    let mut ow = OneWireProgrammer::new(&mut link).with_settle(Duration::ZERO);
    let err = ow.program(3, &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]).unwrap_err();
    assert_eq!(ow.state(), OneWireState::Idle);
    assert!(matches!(
        err,
        ProgramError::ProtocolStatus { step: 3, status: 5, ref message }
            if message == "Device's memory has overflowed."
    ));

    let sent = link.sent();
    let fragments = sent.iter().filter(|r| r.fragment).count();
    assert_eq!(fragments, 3);
    let after = CommandFrame::decode(&sent[sent.len() - 1].bytes)?;
    assert_eq!(after.command_id, commands::OW_SET_PROGRAMMING);
    assert_eq!(after.params(), Some((3, 0)));
    assert_eq!(link.restarts(), 0);
    Ok(())
}

#[test]
fn cancelled_session_sends_no_further_chunks() -> anyhow::Result<()> {
    let mut link = MockLink::default();
    link.push_reply_frame(&ow_reply(0)?);
    link.push_reply_frame(&ow_size(4)?);
    link.push_reply_frame(&ow_reply(0)?);

    let cancel = CancelToken::new();
    cancel.cancel();
    let mut ow = OneWireProgrammer::new(&mut link)
        .with_settle(Duration::ZERO)
        .with_cancel(cancel);
    let err = ow.program(0, &[1, 2, 3, 4, 5]).unwrap_err();
    assert!(matches!(err, ProgramError::Cancelled { step: 3 }));
    assert!(link.sent().iter().all(|r| !r.fragment));
    Ok(())
}

#[test]
fn session_holds_a_shared_link_exclusively() -> anyhow::Result<()> {
    let shared = SharedLink::new(MockLink::default());
    {
        let mut guard = shared.lock()?;
        guard.push_reply_frame(&short_reply(commands::LUT_GET_INQUIRY, 1, 0));
        guard.push_silence();
        let mut lut = LutProgrammer::new(&mut *guard);
        let image = LutImage {
            table: 1,
            inquiry: &[],
            payload: &[],
        };
        assert!(lut.program(&image).is_err());
    }
    let link = shared.into_inner().ok_or_else(|| anyhow::anyhow!("link still shared"))?;
    let frames = link.sent_frames()?;
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[2].params(), Some((1, 0)));
    Ok(())
}
