use std::time::Duration;

use apt_link::{
    commands, Address, CommandFrame, FrameSink, MockLink, RequestResponseChannel, SharedLink,
};

#[test]
fn scripted_replies_play_back_in_order() -> anyhow::Result<()> {
    let mut link = MockLink::default();
    let reply = CommandFrame::long(commands::LUT_SET_INQUIRY + 1, Address::Host, vec![3, 0])?;
    link.push_reply_frame(&reply);
    link.push_silence();

    let first = link.receive_timeout(Duration::from_millis(10))?;
    assert_eq!(first, Some(reply.to_bytes()));
    assert_eq!(link.receive_timeout(Duration::from_millis(10))?, None);
    // Script exhausted
    assert_eq!(link.receive_timeout(Duration::from_millis(10))?, None);
    assert!(link.receive().is_err());
    Ok(())
}

#[test]
fn fragments_record_only_the_requested_prefix() -> anyhow::Result<()> {
    let mut link = MockLink::default();
    let buf = [1u8, 2, 3, 4, 5, 6, 7, 8, 9];
    link.send_fragment(&buf, 4)?;
    assert_eq!(link.sent()[0].bytes, vec![1, 2, 3, 4]);
    assert!(link.sent()[0].fragment);
    assert!(link.send_fragment(&buf, 10).is_err());
    Ok(())
}

#[test]
fn restart_is_recorded_as_a_frame() -> anyhow::Result<()> {
    let mut link = MockLink::default();
    link.restart_device()?;
    assert_eq!(link.restarts(), 1);
    let frames = link.sent_frames()?;
    assert_eq!(frames[0].command_id, commands::RESTART_PROCESSOR);
    assert_eq!(frames[0].params(), Some((1, 0)));
    Ok(())
}

#[test]
fn shared_link_serializes_senders() -> anyhow::Result<()> {
    let shared = SharedLink::new(MockLink::default());
    let mut a = shared.clone();
    let mut b = shared.clone();
    a.send_frame(&CommandFrame::short(0x0223, Address::Slot(0), 0, 0))?;
    b.send_frame(&CommandFrame::short(0x0223, Address::Slot(1), 0, 0))?;
    {
        let guard = shared.lock()?;
        let frames = guard.sent_frames()?;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].destination, Address::Slot(1));
    }
    drop((a, b));
    let inner = shared.into_inner();
    assert!(inner.is_some());
    Ok(())
}
