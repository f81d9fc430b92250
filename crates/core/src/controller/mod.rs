use std::path::Path;
use std::sync::Arc;

use crate::{
    AppConfig, AudioInput, ChannelCommand, DmxTransport, Fixture, FrameBuffer, ProgramSlot, Result,
    Scene, Speed, Transmitter,
};

/// Owns the runtime pieces for the lifetime of the process: the frame
/// buffer, the transmission worker and the Program slot.
#[derive(Debug)]
pub struct DmxController {
    buffer: FrameBuffer,
    fixtures: Vec<Fixture>,
    programs: ProgramSlot,
    transmitter: Transmitter,
}

impl DmxController {
    /// Builds the buffer, starts transmitting and creates an empty Program
    /// slot.
    pub fn start(
        config: &AppConfig,
        transport: Box<dyn DmxTransport>,
        audio_input: Arc<dyn AudioInput>,
    ) -> Result<Self> {
        let buffer = FrameBuffer::new();
        let transmitter = Transmitter::spawn(buffer.clone(), transport, config.dmx.timing())?;
        let programs = ProgramSlot::new(
            buffer.clone(),
            Speed::new(config.speed as i32),
            audio_input,
            config.audio.clone(),
        );
        let fixtures = config.fixtures.fixtures();
        tracing::info!(fixtures = fixtures.len(), mode = ?config.fixtures.mode, "controller ready");

        Ok(Self {
            buffer,
            fixtures,
            programs,
            transmitter,
        })
    }

    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    /// Patched fixtures, in patch order.
    pub fn fixtures(&self) -> &[Fixture] {
        &self.fixtures
    }

    pub fn programs(&self) -> &ProgramSlot {
        &self.programs
    }

    pub fn transmitter(&self) -> &Transmitter {
        &self.transmitter
    }

    /// Manual single-channel write, 0-based.
    pub fn set_channel(&self, channel: usize, value: i32) -> bool {
        self.buffer.write(channel, value)
    }

    pub fn apply_remote(&self, command: ChannelCommand) -> bool {
        command.apply(&self.buffer)
    }

    /// Zeroes every channel of every patched fixture.
    pub fn blackout(&self) {
        for fixture in &self.fixtures {
            fixture.blackout(&self.buffer);
        }
        tracing::info!("blackout");
    }

    pub fn save_scene(&self, path: impl AsRef<Path>) -> Result<()> {
        Scene::capture(&self.buffer).save(path)
    }

    /// Loads a scene into the live buffer; unreadable files apply all zeros.
    pub fn load_scene(&self, path: impl AsRef<Path>) {
        Scene::load(path).apply(&self.buffer);
    }

    /// Stops the active program, then the transmitter.
    pub fn shutdown(mut self) {
        self.programs.stop_program();
        self.transmitter.stop();
        tracing::info!("controller shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AddressingMode, EffectKind, NullTransport, ProgramKind, UnavailableInput};
    use std::time::Duration;

    fn controller(mode: AddressingMode) -> DmxController {
        let mut config = AppConfig::default();
        config.fixtures.mode = mode;
        config.fixtures.count = 3;
        DmxController::start(
            &config,
            Box::new(NullTransport::default()),
            Arc::new(UnavailableInput),
        )
        .unwrap()
    }

    #[test]
    fn runs_programs_while_transmitting() {
        let controller = controller(AddressingMode::Extended);
        let fixtures = controller.fixtures().to_vec();
        assert_eq!(fixtures[2].start_channel(), 29);

        // Slowest chase keeps the first palette colour for the whole test.
        controller.programs().set_speed(1);
        controller
            .programs()
            .start_effect(EffectKind::ColorChase, fixtures)
            .unwrap();
        std::thread::sleep(Duration::from_millis(60));

        assert_eq!(
            controller.programs().current(),
            Some(ProgramKind::Effect(EffectKind::ColorChase))
        );
        assert!(controller.transmitter().stats().frames_sent() > 0);
        assert_eq!(controller.buffer().read(28 + 6), Some(255));
        controller.shutdown();
    }

    #[test]
    fn blackout_only_touches_patched_fixtures() {
        let controller = controller(AddressingMode::Compact);
        controller.buffer().load(&[5; 40]);

        controller.blackout();

        let frame = controller.buffer().snapshot();
        assert!(frame[..27].iter().all(|value| *value == 0));
        assert_eq!(frame[27], 5);
        controller.shutdown();
    }

    #[test]
    fn remote_and_scene_writes_reach_the_buffer() {
        let controller = controller(AddressingMode::Extended);
        assert!(controller.apply_remote(ChannelCommand::new(10, 128)));
        assert!(controller.set_channel(11, 64));

        let path = std::env::temp_dir().join(format!("dmx-ctl-{}.json", std::process::id()));
        controller.save_scene(&path).unwrap();
        controller.buffer().clear();
        controller.load_scene(&path);

        assert_eq!(controller.buffer().read(9), Some(128));
        assert_eq!(controller.buffer().read(11), Some(64));
        std::fs::remove_file(path).ok();
        controller.shutdown();
    }
}
