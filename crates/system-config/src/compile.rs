use apt_link::{Address, CommandFrame};

use crate::Result;

/// An entity that can be turned into the frames that apply it.
pub trait Compile {
    fn compile(&self) -> Result<Vec<CommandFrame>>;
}

/// An entity whose applied parameters the device can commit to non-volatile storage.
pub trait Persistable: Compile {
    /// Address and channel the commit frames are sent to.
    fn persist_target(&self) -> (Address, u16);

    /// Compile, then when `persist` is set append one commit frame per distinct command
    /// id, in the order those commands first appear.
    fn compile_persistent(&self, persist: bool) -> Result<Vec<CommandFrame>> {
        let mut frames = self.compile()?;
        if persist {
            let (destination, channel) = self.persist_target();
            let commits = persist_frames(&frames, destination, channel);
            frames.extend(commits);
        }
        Ok(frames)
    }
}

/// Commit frames for every distinct command id in `frames`.
pub(crate) fn persist_frames(
    frames: &[CommandFrame],
    destination: Address,
    channel: u16,
) -> Vec<CommandFrame> {
    let mut ids: Vec<u16> = Vec::new();
    for f in frames {
        if !ids.contains(&f.command_id) {
            ids.push(f.command_id);
        }
    }
    ids.into_iter()
        .map(|id| CommandFrame::persist(destination, channel, id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use apt_link::commands;

    struct Twice;

    impl Compile for Twice {
        fn compile(&self) -> Result<Vec<CommandFrame>> {
            Ok(vec![
                CommandFrame::long(commands::SET_STORE_POSITION, Address::Slot(2), vec![0; 4])?,
                CommandFrame::long(commands::MCM_SET_HOMEPARAMS, Address::Slot(2), vec![0; 4])?,
                CommandFrame::long(commands::SET_STORE_POSITION, Address::Slot(2), vec![1; 4])?,
            ])
        }
    }

    impl Persistable for Twice {
        fn persist_target(&self) -> (Address, u16) {
            (Address::Slot(2), 0)
        }
    }

    #[test]
    fn commit_frames_follow_once_per_command() {
        let plain = Twice.compile_persistent(false).unwrap();
        assert_eq!(plain.len(), 3);

        let frames = Twice.compile_persistent(true).unwrap();
        assert_eq!(frames.len(), 5);
        assert_eq!(frames[3], CommandFrame::persist(Address::Slot(2), 0, commands::SET_STORE_POSITION));
        assert_eq!(frames[4], CommandFrame::persist(Address::Slot(2), 0, commands::MCM_SET_HOMEPARAMS));
    }
}
