mod common;

use bridge_traits::background::LifecycleState;
use bridge_traits::playback::{
    AudioSessionEvent, CommandStatus, MediaEngine, RemoteCommand, RemoteCommandKind,
    RouteChangeReason,
};
use common::{entries, permissive_remote, rig, rig_with, FakeEngine, MockRemote};
use core_playback::{LoopMode, PlaybackError, Reconciliation};
use core_runtime::events::{CoreEvent, PlaybackEvent};
use std::time::Duration;

#[tokio::test]
async fn test_play_loads_source_and_registers_commands_once() {
    let mut remote = MockRemote::new();
    remote
        .expect_enable()
        .withf(|commands, interval| {
            commands.len() == RemoteCommandKind::ALL.len() && *interval == Duration::from_secs(15)
        })
        .times(1)
        .returning(|_, _| Ok(()));
    let rig = rig_with(FakeEngine::with_duration(Some(Duration::from_secs(100))), remote);
    rig.session.apply_playlist(entries(3));

    rig.session.play_entry(0).unwrap();
    rig.session.play_entry(1).unwrap();

    assert!(rig.session.is_playing());
    assert_eq!(rig.engine.replacements(), 2);
    assert_eq!(rig.audio.activations(), 2);
    assert_eq!(
        rig.session.current_url().as_deref(),
        Some("file:///media/audios/track-1.m4a")
    );

    let info = rig.last_published().unwrap();
    assert_eq!(info.title, "Track 1");
    assert_eq!(info.rate, 1.0);
    assert_eq!(info.duration, Some(Duration::from_secs(100)));
}

#[tokio::test]
async fn test_playing_active_source_resumes_without_reload() {
    let rig = rig();
    rig.session.apply_playlist(entries(2));
    rig.session.play_entry(0).unwrap();
    rig.engine.set_position(Duration::from_secs(42));
    rig.session.pause();

    rig.session.play_url("file:///media/audios/track-0.m4a", "ignored");

    assert_eq!(rig.engine.replacements(), 1);
    assert_eq!(rig.engine.position(), Duration::from_secs(42));
    assert!(rig.session.is_playing());
    assert_eq!(rig.session.state().current_entry_index, Some(0));
}

#[tokio::test]
async fn test_play_url_outside_playlist() {
    let rig = rig();
    rig.session.play_url("file:///elsewhere/a.mp3", "Loose");

    let state = rig.session.state();
    assert_eq!(state.current_entry_index, None);
    assert_eq!(state.current_url.as_deref(), Some("file:///elsewhere/a.mp3"));
    assert_eq!(rig.last_published().unwrap().title, "Loose");
}

#[tokio::test]
async fn test_engine_error_means_not_playing() {
    let engine = FakeEngine::with_duration(Some(Duration::from_secs(10)));
    engine
        .unplayable
        .lock()
        .insert("file:///media/audios/track-0.m4a".to_string());
    let rig = rig_with(engine, permissive_remote());
    let mut events = rig.bus.subscribe();
    rig.session.apply_playlist(entries(1));

    rig.session.play_entry(0).unwrap();

    // The engine accepted play() but reports an error.
    assert_eq!(rig.engine.rate(), 1.0);
    assert!(!rig.session.is_playing());
    assert!(!rig.session.state().is_playing);
    assert!(matches!(
        events.recv().await.unwrap(),
        CoreEvent::Playback(PlaybackEvent::Error { .. })
    ));
}

#[tokio::test]
async fn test_play_entry_out_of_range() {
    let rig = rig();
    rig.session.apply_playlist(entries(2));

    assert!(matches!(
        rig.session.play_entry(5),
        Err(PlaybackError::IndexOutOfRange { index: 5, len: 2 })
    ));
    assert!(matches!(rig.session.resume(), Err(PlaybackError::NoSource)));
}

#[tokio::test]
async fn test_next_wraps_with_loop_all() {
    let rig = rig();
    rig.session.apply_playlist(entries(5));
    rig.session.set_loop_mode(LoopMode::All);
    rig.session.play_entry(2).unwrap();

    let mut visited = Vec::new();
    for _ in 0..3 {
        assert!(rig.session.next().await);
        visited.push(rig.session.state().current_entry_index.unwrap());
    }

    assert_eq!(visited, vec![3, 4, 0]);
    assert_eq!(
        rig.session.current_url().as_deref(),
        Some("file:///media/audios/track-0.m4a")
    );
}

#[tokio::test]
async fn test_loop_off_stops_at_boundaries() {
    let rig = rig();
    rig.session.apply_playlist(entries(2));
    rig.session.play_entry(1).unwrap();

    assert!(!rig.session.next().await);
    assert_eq!(rig.session.state().current_entry_index, Some(1));

    assert!(rig.session.previous().await);
    assert!(!rig.session.previous().await);
    assert_eq!(rig.session.state().current_entry_index, Some(0));
}

#[tokio::test]
async fn test_loop_one_restarts_current_entry() {
    let rig = rig();
    rig.session.apply_playlist(entries(3));
    rig.session.set_loop_mode(LoopMode::One);
    rig.session.play_entry(1).unwrap();
    rig.engine.set_position(Duration::from_secs(30));

    assert!(rig.session.handle_item_finished().await);

    assert_eq!(rig.session.state().current_entry_index, Some(1));
    assert_eq!(rig.engine.replacements(), 1);
    assert_eq!(rig.engine.position(), Duration::ZERO);
    assert!(rig.session.is_playing());
}

#[tokio::test]
async fn test_item_finished_at_end_stops() {
    let rig = rig();
    rig.session.apply_playlist(entries(2));
    rig.session.play_entry(1).unwrap();

    assert!(!rig.session.handle_item_finished().await);
    assert!(!rig.session.is_playing());
    assert_eq!(rig.last_published().unwrap().rate, 0.0);
}

#[tokio::test]
async fn test_shuffle_picks_entries_in_range() {
    let rig = rig();
    rig.session.apply_playlist(entries(4));
    rig.session.set_shuffle(true);
    rig.session.play_entry(0).unwrap();

    for _ in 0..20 {
        assert!(rig.session.next().await);
        let index = rig.session.state().current_entry_index.unwrap();
        assert!(index < 4);
    }
    assert!(rig.session.state().shuffle_enabled);
}

#[tokio::test]
async fn test_seek_clamps_to_playable_range() {
    let rig = rig();
    rig.session.apply_playlist(entries(1));
    rig.session.play_entry(0).unwrap();

    rig.session.seek_to(Duration::from_secs(500)).await.unwrap();
    assert_eq!(rig.engine.position(), Duration::from_millis(99_500));

    rig.engine.set_position(Duration::from_secs(10));
    rig.session.seek_by(-30.0).await.unwrap();
    assert_eq!(rig.engine.position(), Duration::ZERO);
}

#[tokio::test]
async fn test_seek_on_indefinite_source_has_no_upper_bound() {
    let rig = rig_with(FakeEngine::with_duration(None), permissive_remote());
    rig.session.play_url("http://radio.example.com/live", "Live");

    rig.session.seek_to(Duration::from_secs(5_000)).await.unwrap();

    assert_eq!(rig.engine.position(), Duration::from_secs(5_000));
    assert_eq!(rig.last_published().unwrap().duration, None);
}

#[tokio::test]
async fn test_seek_resumes_only_after_completion() {
    let rig = rig();
    rig.session.apply_playlist(entries(1));
    rig.session.play_entry(0).unwrap();

    assert!(rig.session.seek_to(Duration::from_secs(20)).await.unwrap());

    // Paused while the seek was in flight, playing again after.
    let seeks = rig.engine.state.lock().seeks.clone();
    assert_eq!(seeks, vec![(Duration::from_secs(20), 0.0)]);
    assert!(rig.session.is_playing());

    rig.session.pause();
    rig.session.seek_to(Duration::from_secs(5)).await.unwrap();
    assert!(!rig.session.is_playing());
}

#[tokio::test]
async fn test_overlapping_seeks_resume_once() {
    let rig = rig();
    rig.session.apply_playlist(entries(1));
    rig.session.play_entry(0).unwrap();

    let (first, second) = tokio::join!(
        rig.session.seek_to(Duration::from_secs(10)),
        rig.session.seek_to(Duration::from_secs(20))
    );
    assert!(!first.unwrap());
    assert!(second.unwrap());

    assert!(rig.session.is_playing());
    assert_eq!(rig.engine.position(), Duration::from_secs(20));
}

#[tokio::test]
async fn test_source_change_supersedes_inflight_seek() {
    let rig = rig();
    rig.session.apply_playlist(entries(2));
    rig.session.play_entry(0).unwrap();

    let (seeked, _) = tokio::join!(rig.session.seek_to(Duration::from_secs(10)), async {
        rig.session.play_entry(1).unwrap();
    });

    assert!(!seeked.unwrap());
    assert_eq!(
        rig.engine.current_source().as_deref(),
        Some("file:///media/audios/track-1.m4a")
    );
    assert!(rig.session.is_playing());
}

#[tokio::test]
async fn test_interruption_without_resume_hint_stays_paused() {
    let rig = rig();
    rig.session.apply_playlist(entries(1));
    rig.session.play_entry(0).unwrap();

    rig.session.handle_audio_event(AudioSessionEvent::InterruptionBegan);
    assert!(!rig.session.is_playing());
    assert_eq!(rig.last_published().unwrap().rate, 0.0);

    rig.session
        .handle_audio_event(AudioSessionEvent::InterruptionEnded { should_resume: false });
    assert!(!rig.session.is_playing());
}

#[tokio::test]
async fn test_interruption_with_resume_hint_reactivates_and_resumes() {
    let rig = rig();
    rig.session.apply_playlist(entries(1));
    rig.session.play_entry(0).unwrap();
    let activations = rig.audio.activations();

    rig.session.handle_audio_event(AudioSessionEvent::InterruptionBegan);
    rig.session
        .handle_audio_event(AudioSessionEvent::InterruptionEnded { should_resume: true });

    assert!(rig.session.is_playing());
    assert_eq!(rig.audio.activations(), activations + 1);
    assert_eq!(rig.last_published().unwrap().rate, 1.0);
}

#[tokio::test]
async fn test_interruption_while_paused_does_not_resume() {
    let rig = rig();
    rig.session.apply_playlist(entries(1));
    rig.session.play_entry(0).unwrap();
    rig.session.pause();

    rig.session.handle_audio_event(AudioSessionEvent::InterruptionBegan);
    rig.session
        .handle_audio_event(AudioSessionEvent::InterruptionEnded { should_resume: true });

    assert!(!rig.session.is_playing());
}

#[tokio::test]
async fn test_route_loss_pauses_without_auto_resume() {
    let rig = rig();
    rig.session.apply_playlist(entries(1));
    rig.session.play_entry(0).unwrap();

    rig.session.handle_audio_event(AudioSessionEvent::RouteChanged(
        RouteChangeReason::OldDeviceUnavailable,
    ));
    assert!(!rig.session.is_playing());

    rig.session.handle_audio_event(AudioSessionEvent::RouteChanged(
        RouteChangeReason::NewDeviceAvailable,
    ));
    assert!(!rig.session.is_playing());
}

#[tokio::test]
async fn test_watch_audio_events_follows_stream() {
    let rig = rig();
    rig.session.apply_playlist(entries(1));
    rig.session.play_entry(0).unwrap();
    let handle = rig.session.watch_audio_events().await.unwrap();

    rig.audio
        .sender
        .send(AudioSessionEvent::InterruptionBegan)
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while rig.session.is_playing() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
    handle.abort();
}

#[tokio::test]
async fn test_lifecycle_detaches_surface_in_background() {
    let rig = rig();
    rig.session.apply_playlist(entries(1));
    rig.session.play_entry(0).unwrap();

    rig.session.handle_lifecycle_change(LifecycleState::Background);
    assert!(!rig.engine.state.lock().surface_attached);
    assert!(rig.session.is_playing());

    rig.session.handle_lifecycle_change(LifecycleState::Foreground);
    assert!(rig.engine.state.lock().surface_attached);
}

#[tokio::test]
async fn test_remote_commands_route_to_transport() {
    let rig = rig();

    assert_eq!(
        rig.session.handle_remote_command(RemoteCommand::Play).await,
        CommandStatus::Failure
    );
    assert_eq!(
        rig.session.handle_remote_command(RemoteCommand::Pause).await,
        CommandStatus::Failure
    );

    rig.session.apply_playlist(entries(3));
    rig.session.play_entry(0).unwrap();
    rig.engine.set_position(Duration::from_secs(10));

    assert_eq!(
        rig.session
            .handle_remote_command(RemoteCommand::SkipForward(Duration::from_secs(15)))
            .await,
        CommandStatus::Success
    );
    assert_eq!(rig.engine.position(), Duration::from_secs(25));

    rig.session
        .handle_remote_command(RemoteCommand::SkipBackward(Duration::from_secs(15)))
        .await;
    assert_eq!(rig.engine.position(), Duration::from_secs(10));

    rig.session
        .handle_remote_command(RemoteCommand::ChangePlaybackPosition(Duration::from_secs(60)))
        .await;
    assert_eq!(rig.engine.position(), Duration::from_secs(60));

    rig.session
        .handle_remote_command(RemoteCommand::TogglePlayPause)
        .await;
    assert!(!rig.session.is_playing());

    assert_eq!(
        rig.session.handle_remote_command(RemoteCommand::NextTrack).await,
        CommandStatus::Success
    );
    assert_eq!(rig.session.state().current_entry_index, Some(1));

    assert_eq!(
        rig.session
            .handle_remote_command(RemoteCommand::PreviousTrack)
            .await,
        CommandStatus::Success
    );
    assert_eq!(
        rig.session
            .handle_remote_command(RemoteCommand::PreviousTrack)
            .await,
        CommandStatus::Failure
    );
}

#[tokio::test]
async fn test_start_at_defers_until_entry_exists() {
    let rig = rig();
    let playlist = entries(3);
    rig.session.apply_playlist(playlist[..2].to_vec());

    assert!(!rig.session.start_at(&playlist[2].url));
    assert_eq!(rig.session.pending_start_url().as_deref(), Some(playlist[2].url.as_str()));
    assert_eq!(rig.engine.replacements(), 0);

    let outcome = rig.session.apply_playlist(playlist.clone());

    assert_eq!(outcome, Reconciliation::StartAt(2));
    assert_eq!(rig.session.current_url().as_deref(), Some(playlist[2].url.as_str()));
    assert!(rig.session.pending_start_url().is_none());
}

#[tokio::test]
async fn test_stop_clears_everything() {
    let rig = rig();
    rig.session.apply_playlist(entries(2));
    rig.session.play_entry(0).unwrap();

    rig.session.stop();

    assert!(rig.engine.current_source().is_none());
    assert!(rig.session.current_url().is_none());
    assert_eq!(rig.clears(), 1);
    assert_eq!(rig.audio.deactivations.load(std::sync::atomic::Ordering::SeqCst), 1);
}
