use plaza_common::config::DevicesConfig;
use plaza_presence::{MediaDevices, MediaError, MediaState};

#[derive(Debug, Clone)]
pub struct HeadlessDevices {
    microphone: bool,
    camera: bool,
}

impl From<&DevicesConfig> for HeadlessDevices {
    fn from(config: &DevicesConfig) -> Self {
        Self {
            microphone: config.microphone,
            camera: config.camera,
        }
    }
}

impl HeadlessDevices {
    pub fn apply(&mut self, media: &mut MediaState, microphone: bool, camera: bool) {
        if microphone && !media.mic_on {
            media.mic_on = self.open_microphone().is_ok();
        }
        if camera && !media.camera_on {
            media.camera_on = self.open_camera().is_ok();
        }
    }
}

impl MediaDevices for HeadlessDevices {
    fn open_microphone(&mut self) -> Result<(), MediaError> {
        if self.microphone {
            Ok(())
        } else {
            Err(MediaError::Unavailable("microphone"))
        }
    }

    fn open_camera(&mut self) -> Result<(), MediaError> {
        if self.camera {
            Ok(())
        } else {
            Err(MediaError::Unavailable("camera"))
        }
    }

    fn stop_screen_share(&mut self) {
        tracing::info!("screen share stopped");
    }
}
