//! The sound system driven from the sound thread.

use std::sync::Arc;
use std::time::{Duration, Instant};

use atk_core::SoundArchiveParam;
use atk_hardware::{HardwareManager, HardwareManagerParameter, SoftwareRenderer, SoundThread};
use atk_sound::{
    PlayerEntry, SoundArchive, SoundEntry, SoundHandle, SoundKindInfo, SoundStartInfo, SoundSystem,
    SoundSystemFrameCallback,
};
use parking_lot::Mutex;

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    done()
}

#[test]
fn short_sound_plays_out_on_the_sound_thread() {
    let hw = Arc::new(
        HardwareManager::initialize(
            HardwareManagerParameter::default().with_sound_thread(true),
            Box::new(SoftwareRenderer::new()),
        )
        .unwrap(),
    );
    let mut archive = SoundArchive::new();
    let player = archive.add_player(PlayerEntry {
        name: "se".into(),
        playable_sound_count: 1,
        ..Default::default()
    });
    let blip = archive.add_sound(SoundEntry {
        name: "blip".into(),
        player,
        param: SoundArchiveParam::default(),
        kind: SoundKindInfo::Wave {
            channel_count: 2,
            length_frames: Some(10),
        },
        is_3d: false,
    });

    let system = Arc::new(Mutex::new(SoundSystem::new(hw.clone(), archive)));
    let thread = SoundThread::spawn(hw.clone()).unwrap().expect("sound thread enabled");
    thread.register_callback(Box::new(SoundSystemFrameCallback(system.clone())));

    let mut handle = SoundHandle::new();
    system
        .lock()
        .start_sound(&mut handle, blip, &SoundStartInfo::default())
        .unwrap();

    assert!(wait_until(Duration::from_secs(5), || !handle.is_attached()));
    assert_eq!(system.lock().playing_sound_count(), 0);
    assert_eq!(hw.active_voice_count(), 0);
    assert!(thread.frame_count() > 0);

    thread.shutdown();
    system.lock().finalize();
}

#[test]
fn disabled_thread_is_not_spawned() {
    let hw = Arc::new(
        HardwareManager::initialize(
            HardwareManagerParameter::default().with_sound_thread(false),
            Box::new(SoftwareRenderer::new()),
        )
        .unwrap(),
    );
    assert!(SoundThread::spawn(hw).unwrap().is_none());
}
