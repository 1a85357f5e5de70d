//! Audio codec control contract.
//!
//! Register maps live with the board; the platform only needs to start the
//! codec, set channel gains and (un)mute channels.

/// Analog path of the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecChannel {
    LineInput,
    AuxInput,
    LineOutput,
    HeadphoneOutput,
    MicInput,
}

/// Trait for audio codecs controlled over a side channel (usually I2C).
pub trait AudioCodec {
    /// Error type for control operations.
    type Error: core::fmt::Debug;

    /// Run the power-up and clocking sequence. Channels stay muted.
    fn start(&mut self) -> Result<(), Self::Error>;

    /// Set the gain of a stereo channel in dB.
    fn set_gain(
        &mut self,
        channel: CodecChannel,
        left_db: f32,
        right_db: f32,
    ) -> Result<(), Self::Error>;

    /// Mute (`true`) or unmute (`false`) a channel.
    fn mute(&mut self, channel: CodecChannel, mute: bool) -> Result<(), Self::Error>;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::vec::Vec;

    #[derive(Debug, Clone, Copy, PartialEq)]
    pub(crate) enum CodecCall {
        Start,
        Gain(CodecChannel, f32, f32),
        Mute(CodecChannel, bool),
    }

    /// Codec that records every call into a shared log.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingCodec {
        pub calls: Arc<Mutex<Vec<CodecCall>>>,
        pub fail_start: bool,
    }

    impl RecordingCodec {
        pub(crate) fn calls(&self) -> Vec<CodecCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl AudioCodec for RecordingCodec {
        type Error = &'static str;

        fn start(&mut self) -> Result<(), Self::Error> {
            if self.fail_start {
                return Err("codec did not answer");
            }
            self.calls.lock().unwrap().push(CodecCall::Start);
            Ok(())
        }

        fn set_gain(
            &mut self,
            channel: CodecChannel,
            left_db: f32,
            right_db: f32,
        ) -> Result<(), Self::Error> {
            self.calls
                .lock()
                .unwrap()
                .push(CodecCall::Gain(channel, left_db, right_db));
            Ok(())
        }

        fn mute(&mut self, channel: CodecChannel, mute: bool) -> Result<(), Self::Error> {
            self.calls.lock().unwrap().push(CodecCall::Mute(channel, mute));
            Ok(())
        }
    }

    #[test]
    fn recording_codec_keeps_call_order() {
        let mut codec = RecordingCodec::default();
        codec.start().unwrap();
        codec.mute(CodecChannel::HeadphoneOutput, false).unwrap();
        assert_eq!(
            codec.calls(),
            [
                CodecCall::Start,
                CodecCall::Mute(CodecChannel::HeadphoneOutput, false)
            ]
        );
    }
}
