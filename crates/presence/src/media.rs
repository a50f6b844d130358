use crate::error::MediaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalMedia {
    AudioVideo,
    AudioOnly,
    VideoOnly,
    Placeholder,
}

impl LocalMedia {
    pub fn has_audio(&self) -> bool {
        matches!(self, LocalMedia::AudioVideo | LocalMedia::AudioOnly)
    }

    pub fn has_video(&self) -> bool {
        matches!(self, LocalMedia::AudioVideo | LocalMedia::VideoOnly)
    }
}

pub trait MediaDevices {
    fn open_microphone(&mut self) -> Result<(), MediaError>;
    fn open_camera(&mut self) -> Result<(), MediaError>;
    fn stop_screen_share(&mut self);
}

// Never fails: a denied camera degrades to audio only, and with nothing
// available the call carries a placeholder.
pub fn acquire_local_media(devices: &mut impl MediaDevices, audio: bool, video: bool) -> LocalMedia {
    let audio = audio
        && match devices.open_microphone() {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "microphone unavailable");
                false
            }
        };
    let video = video
        && match devices.open_camera() {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "camera unavailable; continuing without video");
                false
            }
        };
    match (audio, video) {
        (true, true) => LocalMedia::AudioVideo,
        (true, false) => LocalMedia::AudioOnly,
        (false, true) => LocalMedia::VideoOnly,
        (false, false) => LocalMedia::Placeholder,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Devices {
        mic: Result<(), MediaError>,
        camera: Result<(), MediaError>,
        opened: Vec<&'static str>,
    }

    impl MediaDevices for Devices {
        fn open_microphone(&mut self) -> Result<(), MediaError> {
            self.opened.push("mic");
            self.mic.clone()
        }

        fn open_camera(&mut self) -> Result<(), MediaError> {
            self.opened.push("camera");
            self.camera.clone()
        }

        fn stop_screen_share(&mut self) {}
    }

    fn devices(mic: Result<(), MediaError>, camera: Result<(), MediaError>) -> Devices {
        Devices {
            mic,
            camera,
            opened: Vec::new(),
        }
    }

    #[test]
    fn denied_camera_degrades_to_audio() {
        let mut d = devices(Ok(()), Err(MediaError::Denied("camera")));
        assert_eq!(acquire_local_media(&mut d, true, true), LocalMedia::AudioOnly);
    }

    #[test]
    fn nothing_available_is_a_placeholder() {
        let mut d = devices(
            Err(MediaError::Unavailable("microphone")),
            Err(MediaError::Unavailable("camera")),
        );
        let media = acquire_local_media(&mut d, true, true);
        assert_eq!(media, LocalMedia::Placeholder);
        assert!(!media.has_audio() && !media.has_video());
    }

    #[test]
    fn unrequested_devices_are_not_opened() {
        let mut d = devices(Ok(()), Ok(()));
        assert_eq!(acquire_local_media(&mut d, true, false), LocalMedia::AudioOnly);
        assert_eq!(d.opened, vec!["mic"]);
    }
}
