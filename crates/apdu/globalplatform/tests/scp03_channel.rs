//! SCP03 end-to-end tests against the software card

mod common;

use common::SoftCard;

use tessera_apdu_core::{
    CardExecutor, ChannelState, Command, Error as CoreError, Executor, MockTransport,
};
use tessera_apdu_globalplatform::{
    Error, KeyRef, Scp03KeyParams, ScpKeyParams, SecurityDomain, StaticKeys,
};

fn default_params() -> ScpKeyParams {
    ScpKeyParams::Scp03(Scp03KeyParams::factory_default())
}

fn open_session() -> SecurityDomain<CardExecutor<SoftCard>> {
    let mut session = SecurityDomain::new(CardExecutor::new(SoftCard::new()));
    session.select_security_domain().unwrap();
    session.authenticate(default_params()).unwrap();
    session
}

#[test]
fn scp03_happy_path() {
    let mut session = open_session();
    assert_eq!(session.executor().channel_state(), ChannelState::Open);
    assert!(session.executor().security_level().authenticated);
    assert!(session.executor().security_level().confidentiality);

    // Wrapped traffic round-trips through encrypt/MAC on the way out and
    // verify/decrypt on the way back
    let recognition = session.get_card_recognition_data().unwrap();
    assert_eq!(recognition.as_ref(), &[0x66, 0x04, 0x73, 0x02, 0x06, 0x07]);
}

#[test]
fn scp03_sequential_commands_stay_in_sync() {
    let mut session = open_session();
    for _ in 0..10 {
        session.get_card_recognition_data().unwrap();
    }
}

#[test]
fn scp03_duplicate_commands_diverge_on_the_wire() {
    let mut session = open_session();
    session.get_card_recognition_data().unwrap();
    session.get_card_recognition_data().unwrap();

    let commands = &session.executor().transport().commands_seen;
    let last = &commands[commands.len() - 1];
    let previous = &commands[commands.len() - 2];
    // MAC chaining makes identical plaintext commands distinct ciphertext
    assert_ne!(last, previous);
}

#[test]
fn tampered_response_terminates_channel() {
    let mut session = open_session();
    session
        .executor_mut()
        .transport_mut()
        .tamper_next_wrapped_response = true;

    let err = session.get_card_recognition_data().unwrap_err();
    assert!(matches!(
        err,
        Error::GetData(
            tessera_apdu_globalplatform::commands::get_data::GetDataError::Core(
                CoreError::SecureChannel(_)
            )
        )
    ));
    assert_eq!(
        session.executor().channel_state(),
        ChannelState::Terminated
    );

    // The terminated channel fails fast without touching the transport
    let seen = session.executor().transport().commands_seen.len();
    let err = session.get_card_recognition_data().unwrap_err();
    assert!(matches!(
        err,
        Error::GetData(
            tessera_apdu_globalplatform::commands::get_data::GetDataError::Core(
                CoreError::ChannelTerminated
            )
        )
    ));
    assert_eq!(session.executor().transport().commands_seen.len(), seen);
}

#[test]
fn wrong_static_keys_abort_before_external_authenticate() {
    let mut session = SecurityDomain::new(CardExecutor::new(SoftCard::new()));
    session.select_security_domain().unwrap();

    let params = ScpKeyParams::Scp03(Scp03KeyParams {
        key_ref: KeyRef::new(0x01, 0xFF),
        keys: StaticKeys::new([0x11; 16], [0x22; 16], [0x33; 16]),
    });
    let err = session.authenticate(params).unwrap_err();
    assert!(matches!(err, Error::AuthenticationFailed(_)));

    // The card cryptogram mismatch is detected locally: EXTERNAL
    // AUTHENTICATE never reaches the card
    let transport = session.executor().transport();
    assert_eq!(transport.attempts_for_instruction(0x82), 0);
    assert_eq!(transport.attempts_for_instruction(0x50), 1);
    assert_eq!(
        session.executor().channel_state(),
        ChannelState::Terminated
    );
}

#[test]
fn oversized_wrapped_command_uses_command_chaining() {
    let mut session = open_session();

    // 260 bytes of data wraps to a body beyond the short-APDU limit
    let command = Command::new_with_data(0x80, 0xE2, 0x80, 0x00, vec![0x5A; 260]);
    let response = session.executor_mut().transmit(&command).unwrap();
    assert!(response.is_success());

    let commands = &session.executor().transport().commands_seen;
    let count = commands.len();
    let first = &commands[count - 2];
    let last = &commands[count - 1];
    // Chaining plus secure-messaging on the first fragment, secure-messaging
    // only on the final one
    assert_eq!(first[0], 0x94);
    assert_eq!(first[4], 255);
    assert_eq!(last[0], 0x84);

    // The card reassembled the fragments into the stored payload
    assert_eq!(
        session.executor().transport().stored_payloads[0].as_ref(),
        &[0x5A; 260][..]
    );
}

#[test]
fn key_rotation_reauthenticates_under_new_keys() {
    let mut session = open_session();

    let new_keys = StaticKeys::new([0xA1; 16], [0xB2; 16], [0xC3; 16]);
    session
        .put_static_keys(KeyRef::new(0x01, 0x02), new_keys.clone(), 0x00)
        .unwrap();

    // Authenticating again on the same channel under the new keys succeeds
    let rotated = ScpKeyParams::Scp03(Scp03KeyParams {
        key_ref: KeyRef::new(0x01, 0x02),
        keys: new_keys,
    });
    session.authenticate(rotated).unwrap();
    assert_eq!(session.executor().channel_state(), ChannelState::Open);
    session.get_card_recognition_data().unwrap();

    // The retired key values no longer authenticate against the slot
    let stale = ScpKeyParams::Scp03(Scp03KeyParams {
        key_ref: KeyRef::new(0x01, 0x02),
        keys: StaticKeys::default_keys(),
    });
    let err = session.authenticate(stale).unwrap_err();
    assert!(matches!(err, Error::AuthenticationFailed(_)));
}

#[test]
fn card_refusing_handshake_maps_to_authentication_failed() {
    // A card answering INITIALIZE UPDATE with 6982 refuses the handshake
    let mut transport = MockTransport::new();
    transport.push_response(vec![0x69, 0x82]);

    let mut session = SecurityDomain::new(CardExecutor::new(transport));
    let err = session.authenticate(default_params()).unwrap_err();
    assert!(matches!(err, Error::AuthenticationFailed(_)));
    assert_eq!(
        session.executor().channel_state(),
        ChannelState::Terminated
    );
}

#[test]
fn select_absent_application_surfaces_not_found() {
    let mut session = SecurityDomain::new(CardExecutor::new(SoftCard::new()));
    let err = session.select(&[0xA0, 0x00, 0x00, 0x05, 0x27]).unwrap_err();
    assert!(matches!(err, Error::ApplicationNotFound));

    // No handshake is attempted after a failed SELECT
    let transport = session.executor().transport();
    assert_eq!(transport.attempts_for_instruction(0x50), 0);
    assert_eq!(transport.commands_seen.len(), 1);
}

#[test]
fn plaintext_channel_works_without_authentication() {
    let mut session = SecurityDomain::new(CardExecutor::new(SoftCard::new()));
    session.select_security_domain().unwrap();
    assert_eq!(session.executor().channel_state(), ChannelState::Selected);

    let recognition = session.get_card_recognition_data().unwrap();
    assert_eq!(recognition.as_ref(), &[0x66, 0x04, 0x73, 0x02, 0x06, 0x07]);
}

#[test]
fn response_chaining_reassembles_large_objects() {
    let mut session = SecurityDomain::new(CardExecutor::new(SoftCard::new()));
    session.select_security_domain().unwrap();

    let large: Vec<u8> = (0..1500u16).map(|i| i as u8).collect();
    let card = session.executor_mut().transport_mut();
    card.set_data_object(0x00AA, large.clone());
    card.set_response_window(200);

    let fetched = session.get_data(0x00AA).unwrap();
    assert_eq!(fetched.as_ref(), large.as_slice());
}
