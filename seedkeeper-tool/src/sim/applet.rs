//! Seedkeeper/Satochip applet implementation
//!
//! Main dispatcher for the applet commands the host side uses. Plain
//! (non secure-channel) commands only.

use log::{debug, info};
use rand::rngs::OsRng;
use rand::RngCore;

use super::pin_manager::{PINManager, PinCheck};
use super::security_state::SecurityState;
use super::state::{CardState, StoredSecret, TOTAL_MEMORY};
use super::storage::CardDataStore;
use crate::apdu::{ins, step, Response, APDU, CLA, CLA_ISO, SW};
use crate::card::{CardStatus, CardType, SeedkeeperStatus, SeedkeeperVersion};
use crate::protocol::{AIDS, CHUNK_SIZE};
use crate::secret::{fingerprint, SecretHeader, SecretOrigin, SecretType, EXPORT_PLAINTEXT_ALLOWED};

/// Log records returned per PRINT_LOGS continuation
const LOGS_PER_RESPONSE: usize = 4;

struct PendingImport {
    size: usize,
    secret_type: u8,
    export_rights: u8,
    subtype: u8,
    label: String,
    data: Vec<u8>,
}

impl Drop for PendingImport {
    fn drop(&mut self) {
        zeroize::Zeroize::zeroize(&mut self.data);
    }
}

struct PendingExport {
    payload: Vec<u8>,
    offset: usize,
}

impl Drop for PendingExport {
    fn drop(&mut self) {
        zeroize::Zeroize::zeroize(&mut self.payload);
    }
}

/// Seedkeeper or Satochip applet, depending on the stored card type
pub struct SeedkeeperApplet {
    store: CardDataStore,
    pin_manager: PINManager,
    security_state: SecurityState,
    pending_import: Option<PendingImport>,
    pending_export: Option<PendingExport>,
    list_cursor: usize,
    log_cursor: usize,
}

impl SeedkeeperApplet {
    pub fn new(store: CardDataStore) -> Self {
        Self {
            store,
            pin_manager: PINManager::new(),
            security_state: SecurityState::new(),
            pending_import: None,
            pending_export: None,
            list_cursor: 0,
            log_cursor: 0,
        }
    }

    fn state(&self) -> &CardState {
        self.store.get_state()
    }

    fn is_seedkeeper(&self) -> bool {
        self.state().card_type == CardType::Seedkeeper
    }

    fn version(&self) -> SeedkeeperVersion {
        let fw = self.state().firmware;
        SeedkeeperVersion::from_applet_version(fw.applet_major, fw.applet_minor)
    }

    /// Process an APDU command and return the response
    pub fn process_apdu(&mut self, cmd: &APDU) -> Response {
        if cmd.cla == CLA_ISO && cmd.ins == ins::SELECT {
            return self.handle_select(cmd);
        }
        if self.security_state.selected().is_none() {
            return Response::error(SW::CONDITIONS_NOT_SATISFIED);
        }
        if cmd.cla != CLA {
            return Response::error(SW::CLA_NOT_SUPPORTED);
        }

        // Commands available before setup
        match cmd.ins {
            ins::GET_STATUS => return self.handle_get_status(),
            ins::SETUP => return self.handle_setup(cmd),
            ins::EXPORT_PKI_CERTIFICATE => return self.handle_export_certificate(cmd),
            _ => {}
        }
        if !self.state().setup_done {
            return Response::error(SW::SETUP_NOT_DONE);
        }

        match cmd.ins {
            ins::VERIFY_PIN => return self.handle_verify_pin(cmd),
            ins::CHANGE_PIN => return self.handle_change_pin(cmd),
            ins::LOGOUT_ALL => {
                self.security_state.logout();
                return Response::ok();
            }
            ins::CARD_LABEL if cmd.p1 == 0x01 => return self.handle_get_label(),
            _ => {}
        }
        if !self.security_state.is_verified() {
            return Response::error(SW::UNAUTHORIZED);
        }

        match cmd.ins {
            ins::CARD_LABEL => self.handle_set_label(cmd),
            ins::BIP32_IMPORT_SEED if !self.is_seedkeeper() => self.handle_import_seed(cmd),
            _ if !self.is_seedkeeper() => Response::error(SW::INS_NOT_SUPPORTED),
            ins::GENERATE_MASTERSEED => self.handle_generate_masterseed(cmd),
            ins::IMPORT_SECRET => self.handle_import_secret(cmd),
            ins::EXPORT_SECRET => self.handle_export_secret(cmd),
            ins::RESET_SECRET if self.version() >= SeedkeeperVersion::V2 => self.handle_reset_secret(cmd),
            ins::LIST_SECRET_HEADERS => self.handle_list_headers(cmd),
            ins::GET_SEEDKEEPER_STATUS => self.handle_seedkeeper_status(),
            ins::PRINT_LOGS => self.handle_print_logs(cmd),
            _ => Response::error(SW::INS_NOT_SUPPORTED),
        }
    }

    /// Append to the audit log (Seedkeeper only) and persist
    fn record(&mut self, instruction: u8, id1: Option<u16>, id2: Option<u16>, status: u16) {
        if self.is_seedkeeper() {
            self.store.get_state_mut().append_log(instruction, id1, id2, status);
        }
        self.store.save();
    }

    // =========================================================================
    // Command Handlers
    // =========================================================================

    fn handle_select(&mut self, cmd: &APDU) -> Response {
        if cmd.p1 != 0x04 {
            return Response::error(SW::INCORRECT_P1);
        }
        let card_type = self.state().card_type;
        let matches = AIDS
            .iter()
            .any(|(aid, applet)| *applet == card_type && cmd.data.as_slice() == *aid);
        if !matches {
            debug!("Unknown AID: {:02X?}", cmd.data);
            return Response::error(SW::FILE_NOT_FOUND);
        }

        self.security_state.select(card_type);
        self.pending_import = None;
        self.pending_export = None;
        info!("Selected {} applet", card_type);
        Response::ok()
    }

    fn handle_get_status(&self) -> Response {
        let state = self.state();
        let status = CardStatus {
            firmware: state.firmware,
            pin_tries_remaining: state.pin_data.pin_tries_remaining,
            puk_tries_remaining: state.pin_data.puk_tries_remaining,
            needs_2fa: false,
            is_seeded: state.is_seeded,
            setup_done: state.setup_done,
            needs_secure_channel: state.needs_secure_channel,
        };
        Response::success(status.to_bytes())
    }

    fn handle_setup(&mut self, cmd: &APDU) -> Response {
        if self.state().setup_done {
            return Response::error(SW::OPERATION_NOT_ALLOWED);
        }
        let Some(fields) = split_setup(&cmd.data) else {
            return Response::error(SW::WRONG_LENGTH);
        };
        let (pin_tries, pin, puk_tries, puk) = fields;

        let state = self.store.get_state_mut();
        if pin_tries == 0 || !self.pin_manager.length_ok(pin, &state.pin_data) {
            return Response::error(SW::INVALID_PARAMETER);
        }
        self.pin_manager.setup(pin, pin_tries, puk, puk_tries, &mut state.pin_data);
        state.setup_done = true;
        self.store.save();
        info!("Virtual card setup done");
        Response::ok()
    }

    fn handle_verify_pin(&mut self, cmd: &APDU) -> Response {
        let check = self
            .pin_manager
            .verify_pin(&cmd.data, &mut self.store.get_state_mut().pin_data);
        let sw = match check {
            PinCheck::Valid => {
                self.security_state.set_verified();
                SW::SUCCESS
            }
            PinCheck::Wrong(remaining) => {
                self.security_state.logout();
                SW::wrong_pin(remaining)
            }
            PinCheck::Blocked => SW::IDENTITY_BLOCKED,
        };
        self.record(ins::VERIFY_PIN, None, None, sw);
        Response::error(sw)
    }

    fn handle_change_pin(&mut self, cmd: &APDU) -> Response {
        let data = &cmd.data;
        let Some((&old_len, rest)) = data.split_first() else {
            return Response::error(SW::WRONG_LENGTH);
        };
        let old_len = old_len as usize;
        if rest.len() < old_len + 1 {
            return Response::error(SW::WRONG_LENGTH);
        }
        let old = &rest[..old_len];
        let new_len = rest[old_len] as usize;
        let new = &rest[old_len + 1..];
        if new.len() != new_len {
            return Response::error(SW::WRONG_LENGTH);
        }

        let result = self
            .pin_manager
            .change_pin(old, new, &mut self.store.get_state_mut().pin_data);
        let sw = match result {
            None => SW::INVALID_PARAMETER,
            Some(PinCheck::Valid) => SW::SUCCESS,
            Some(PinCheck::Wrong(remaining)) => SW::wrong_pin(remaining),
            Some(PinCheck::Blocked) => SW::IDENTITY_BLOCKED,
        };
        self.record(ins::CHANGE_PIN, None, None, sw);
        Response::error(sw)
    }

    fn handle_get_label(&self) -> Response {
        let label = self.state().label.as_bytes();
        let mut data = Vec::with_capacity(1 + label.len());
        data.push(label.len() as u8);
        data.extend_from_slice(label);
        Response::success(data)
    }

    fn handle_set_label(&mut self, cmd: &APDU) -> Response {
        if cmd.p1 != 0x00 {
            return Response::error(SW::INCORRECT_P1);
        }
        let Some((label, [])) = split_u8_prefixed(&cmd.data) else {
            return Response::error(SW::WRONG_LENGTH);
        };
        let Ok(label) = std::str::from_utf8(label) else {
            return Response::error(SW::INVALID_PARAMETER);
        };
        self.store.get_state_mut().label = label.to_owned();
        self.store.save();
        Response::ok()
    }

    fn handle_import_seed(&mut self, cmd: &APDU) -> Response {
        if self.state().is_seeded {
            return Response::error(SW::OPERATION_NOT_ALLOWED);
        }
        let len = cmd.p1 as usize;
        if len != cmd.data.len() || !(16..=64).contains(&len) {
            return Response::error(SW::WRONG_LENGTH);
        }
        let state = self.store.get_state_mut();
        state.bip32_seed = cmd.data.clone();
        state.is_seeded = true;
        self.store.save();
        info!("BIP32 seed imported");
        Response::ok()
    }

    fn handle_generate_masterseed(&mut self, cmd: &APDU) -> Response {
        let size = cmd.p1 as usize;
        if !(16..=64).contains(&size) {
            return Response::error(SW::INVALID_PARAMETER);
        }
        let Some((label, [])) = split_u8_prefixed(&cmd.data) else {
            return Response::error(SW::WRONG_LENGTH);
        };
        let Ok(label) = std::str::from_utf8(label) else {
            return Response::error(SW::INVALID_PARAMETER);
        };

        let mut payload = vec![0u8; 1 + size];
        payload[0] = size as u8;
        OsRng.fill_bytes(&mut payload[1..]);

        let secret = StoredSecret {
            id: 0,
            secret_type: SecretType::Masterseed.to_byte(),
            origin: SecretOrigin::GeneratedOnCard.to_byte(),
            export_rights: cmd.p2,
            subtype: 0x00,
            nb_export_plain: 0,
            label: label.to_owned(),
            payload,
        };
        let response = self.store_secret(secret, ins::GENERATE_MASTERSEED);
        if response.is_okay() {
            self.store.get_state_mut().is_seeded = true;
            self.store.save();
        }
        response
    }

    /// Assign an id, check memory, persist; answers `id(2) fingerprint(4)`
    fn store_secret(&mut self, mut secret: StoredSecret, instruction: u8) -> Response {
        let state = self.store.get_state_mut();
        if secret.memory_cost() > state.free_memory() as usize {
            self.record(instruction, None, None, SW::NO_MEMORY_LEFT);
            return Response::error(SW::NO_MEMORY_LEFT);
        }
        secret.id = state.next_id;
        state.next_id = state.next_id.wrapping_add(1).max(1);

        let mut data = secret.id.to_be_bytes().to_vec();
        data.extend_from_slice(&fingerprint(&secret.payload));
        let id = secret.id;
        state.secrets.push(secret);
        self.record(instruction, Some(id), None, SW::SUCCESS);
        debug!("Stored secret {}", id);
        Response::success(data)
    }

    fn handle_import_secret(&mut self, cmd: &APDU) -> Response {
        match cmd.p2 {
            step::INIT => {
                let data = &cmd.data;
                if data.len() < 6 {
                    return Response::error(SW::WRONG_LENGTH);
                }
                let size = u16::from_be_bytes([data[0], data[1]]) as usize;
                let secret_type = data[2];
                let export_rights = data[3];
                let subtype = data[4];
                let Some((label, [])) = split_u8_prefixed(&data[5..]) else {
                    return Response::error(SW::WRONG_LENGTH);
                };
                let Ok(label) = std::str::from_utf8(label) else {
                    return Response::error(SW::INVALID_PARAMETER);
                };
                let v2_only = matches!(
                    SecretType::from_byte(secret_type),
                    SecretType::FreeText | SecretType::WalletDescriptor
                );
                if v2_only && self.version() < SeedkeeperVersion::V2 {
                    return Response::error(SW::INVALID_PARAMETER);
                }
                if size > TOTAL_MEMORY as usize {
                    return Response::error(SW::NO_MEMORY_LEFT);
                }
                self.pending_import = Some(PendingImport {
                    size,
                    secret_type,
                    export_rights,
                    subtype,
                    label: label.to_owned(),
                    data: Vec::with_capacity(size),
                });
                Response::ok()
            }
            step::UPDATE | step::FINAL => {
                let Some(pending) = self.pending_import.as_mut() else {
                    return Response::error(SW::CONDITIONS_NOT_SATISFIED);
                };
                if pending.data.len() + cmd.data.len() > pending.size {
                    self.pending_import = None;
                    return Response::error(SW::WRONG_LENGTH);
                }
                pending.data.extend_from_slice(&cmd.data);
                if cmd.p2 == step::UPDATE {
                    return Response::ok();
                }

                let Some(mut pending) = self.pending_import.take() else {
                    return Response::error(SW::CONDITIONS_NOT_SATISFIED);
                };
                if pending.data.len() != pending.size {
                    return Response::error(SW::WRONG_LENGTH);
                }
                let secret = StoredSecret {
                    id: 0,
                    secret_type: pending.secret_type,
                    origin: SecretOrigin::PlainImport.to_byte(),
                    export_rights: pending.export_rights,
                    subtype: pending.subtype,
                    nb_export_plain: 0,
                    label: std::mem::take(&mut pending.label),
                    payload: std::mem::take(&mut pending.data),
                };
                self.store_secret(secret, ins::IMPORT_SECRET)
            }
            _ => Response::error(SW::INCORRECT_P2),
        }
    }

    fn handle_export_secret(&mut self, cmd: &APDU) -> Response {
        match cmd.p2 {
            step::INIT => {
                let Some(id) = read_id(&cmd.data) else {
                    return Response::error(SW::WRONG_LENGTH);
                };
                let position = self.state().secrets.iter().position(|s| s.id == id);
                let Some(index) = position else {
                    self.record(ins::EXPORT_SECRET, Some(id), None, SW::OBJECT_NOT_FOUND);
                    return Response::error(SW::OBJECT_NOT_FOUND);
                };
                let secret = &mut self.store.get_state_mut().secrets[index];
                if secret.export_rights & EXPORT_PLAINTEXT_ALLOWED == 0 {
                    self.record(ins::EXPORT_SECRET, Some(id), None, SW::OPERATION_NOT_ALLOWED);
                    return Response::error(SW::OPERATION_NOT_ALLOWED);
                }
                secret.nb_export_plain = secret.nb_export_plain.saturating_add(1);

                let mut data = header_of(secret).to_bytes();
                data.extend_from_slice(&(secret.payload.len() as u16).to_be_bytes());
                self.pending_export = Some(PendingExport {
                    payload: secret.payload.clone(),
                    offset: 0,
                });
                self.record(ins::EXPORT_SECRET, Some(id), None, SW::SUCCESS);
                Response::success(data)
            }
            step::UPDATE => {
                let Some(pending) = self.pending_export.as_mut() else {
                    return Response::error(SW::CONDITIONS_NOT_SATISFIED);
                };
                let end = (pending.offset + CHUNK_SIZE).min(pending.payload.len());
                let chunk = pending.payload[pending.offset..end].to_vec();
                pending.offset = end;
                if pending.offset >= pending.payload.len() {
                    self.pending_export = None;
                }
                Response::success(chunk)
            }
            _ => Response::error(SW::INCORRECT_P2),
        }
    }

    fn handle_reset_secret(&mut self, cmd: &APDU) -> Response {
        let Some(id) = read_id(&cmd.data) else {
            return Response::error(SW::WRONG_LENGTH);
        };
        let state = self.store.get_state_mut();
        let before = state.secrets.len();
        state.secrets.retain(|s| s.id != id);
        let sw = if state.secrets.len() == before {
            SW::OBJECT_NOT_FOUND
        } else {
            SW::SUCCESS
        };
        self.record(ins::RESET_SECRET, Some(id), None, sw);
        Response::error(sw)
    }

    fn handle_list_headers(&mut self, cmd: &APDU) -> Response {
        match cmd.p2 {
            step::INIT => self.list_cursor = 0,
            step::UPDATE => {}
            _ => return Response::error(SW::INCORRECT_P2),
        }
        match self.state().secrets.get(self.list_cursor) {
            Some(secret) => {
                let data = header_of(secret).to_bytes();
                self.list_cursor += 1;
                Response::success(data)
            }
            None => Response::error(SW::SEQUENCE_END),
        }
    }

    fn handle_seedkeeper_status(&self) -> Response {
        let state = self.state();
        let status = SeedkeeperStatus {
            secret_count: state.secrets.len() as u16,
            total_memory: TOTAL_MEMORY,
            free_memory: state.free_memory(),
            total_logs: state.total_logs.min(u16::MAX as u32) as u16,
            available_logs: state.logs.len() as u16,
            last_log: state.logs.last().cloned(),
        };
        Response::success(status.to_bytes())
    }

    fn handle_print_logs(&mut self, cmd: &APDU) -> Response {
        let logs = &self.store.get_state().logs;
        match cmd.p1 {
            step::INIT => {
                let state = self.state();
                let mut data = Vec::with_capacity(4 + 7);
                data.extend_from_slice(&(state.total_logs.min(u16::MAX as u32) as u16).to_be_bytes());
                data.extend_from_slice(&(logs.len() as u16).to_be_bytes());
                if let Some(first) = logs.first() {
                    data.extend_from_slice(&first.to_record());
                }
                self.log_cursor = 1;
                Response::success(data)
            }
            step::UPDATE => {
                if self.log_cursor >= logs.len() {
                    return Response::error(SW::SEQUENCE_END);
                }
                let end = (self.log_cursor + LOGS_PER_RESPONSE).min(logs.len());
                let data: Vec<u8> = logs[self.log_cursor..end]
                    .iter()
                    .flat_map(|entry| entry.to_record())
                    .collect();
                self.log_cursor = end;
                Response::success(data)
            }
            _ => Response::error(SW::INCORRECT_P1),
        }
    }

    fn handle_export_certificate(&self, cmd: &APDU) -> Response {
        let cert = &self.state().certificate;
        match cmd.p1 {
            step::INIT => Response::success((cert.len() as u16).to_be_bytes().to_vec()),
            step::UPDATE => {
                if cmd.data.len() != 3 {
                    return Response::error(SW::WRONG_LENGTH);
                }
                let offset = u16::from_be_bytes([cmd.data[0], cmd.data[1]]) as usize;
                let len = cmd.data[2] as usize;
                if offset > cert.len() {
                    return Response::error(SW::INVALID_PARAMETER);
                }
                let end = (offset + len).min(cert.len());
                Response::success(cert[offset..end].to_vec())
            }
            _ => Response::error(SW::INCORRECT_P1),
        }
    }

    // =========================================================================
    // Helper Methods
    // =========================================================================

    pub fn get_state(&self) -> &CardState {
        self.store.get_state()
    }

    pub fn get_state_mut(&mut self) -> &mut CardState {
        self.store.get_state_mut()
    }

    pub fn save(&self) -> bool {
        self.store.save()
    }

    /// Power cycle: forget selection, PIN and any multi-part operation
    pub fn reset(&mut self) {
        self.security_state.clear_all();
        self.pending_import = None;
        self.pending_export = None;
        self.list_cursor = 0;
        self.log_cursor = 0;
    }
}

fn header_of(secret: &StoredSecret) -> SecretHeader {
    SecretHeader {
        id: secret.id,
        secret_type: SecretType::from_byte(secret.secret_type),
        origin: SecretOrigin::from_byte(secret.origin),
        export_rights: secret.export_rights,
        nb_export_plain: secret.nb_export_plain,
        nb_export_secure: 0,
        nb_export_pubkey: 0,
        fingerprint: fingerprint(&secret.payload),
        subtype: secret.subtype,
        label: secret.label.clone(),
    }
}

fn read_id(data: &[u8]) -> Option<u16> {
    match data {
        [hi, lo] => Some(u16::from_be_bytes([*hi, *lo])),
        _ => None,
    }
}

/// `len(1) value rest`
fn split_u8_prefixed(data: &[u8]) -> Option<(&[u8], &[u8])> {
    let (&len, rest) = data.split_first()?;
    let len = len as usize;
    if rest.len() < len {
        return None;
    }
    Some(rest.split_at(len))
}

/// `pin_tries pin_len pin puk_tries puk_len puk`
fn split_setup(data: &[u8]) -> Option<(u8, &[u8], u8, &[u8])> {
    let (&pin_tries, rest) = data.split_first()?;
    let (pin, rest) = split_u8_prefixed(rest)?;
    let (&puk_tries, rest) = rest.split_first()?;
    let (puk, rest) = split_u8_prefixed(rest)?;
    if !rest.is_empty() {
        return None;
    }
    Some((pin_tries, pin, puk_tries, puk))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_applet(card_type: CardType) -> SeedkeeperApplet {
        let state = CardState::blank(card_type, 0, 2);
        SeedkeeperApplet::new(CardDataStore::in_memory(state))
    }

    fn select(applet: &mut SeedkeeperApplet, aid: &[u8]) -> Response {
        applet.process_apdu(&APDU::with_data(0x00, ins::SELECT, 0x04, 0x00, aid.to_vec()))
    }

    fn setup(applet: &mut SeedkeeperApplet) {
        let mut data = vec![3, 4];
        data.extend_from_slice(b"1234");
        data.extend_from_slice(&[3, 4]);
        data.extend_from_slice(b"9999");
        let response = applet.process_apdu(&APDU::with_data(CLA, ins::SETUP, 0, 0, data));
        assert!(response.is_okay());
    }

    #[test]
    fn test_select_matching_aid_only() {
        let mut applet = create_test_applet(CardType::Seedkeeper);
        assert_eq!(select(&mut applet, b"SatoChip").sw(), SW::FILE_NOT_FOUND);
        assert!(select(&mut applet, b"SeedKeeper").is_okay());
    }

    #[test]
    fn test_commands_require_selection() {
        let mut applet = create_test_applet(CardType::Seedkeeper);
        let response = applet.process_apdu(&APDU::new(CLA, ins::GET_STATUS, 0, 0));
        assert_eq!(response.sw(), SW::CONDITIONS_NOT_SATISFIED);
    }

    #[test]
    fn test_setup_then_verify() {
        let mut applet = create_test_applet(CardType::Seedkeeper);
        select(&mut applet, b"SeedKeeper");

        let listing = applet.process_apdu(&APDU::new(CLA, ins::LIST_SECRET_HEADERS, 0, step::INIT));
        assert_eq!(listing.sw(), SW::SETUP_NOT_DONE);

        setup(&mut applet);
        let listing = applet.process_apdu(&APDU::new(CLA, ins::LIST_SECRET_HEADERS, 0, step::INIT));
        assert_eq!(listing.sw(), SW::UNAUTHORIZED);

        let wrong = applet.process_apdu(&APDU::with_data(CLA, ins::VERIFY_PIN, 0, 0, b"0000".to_vec()));
        assert_eq!(wrong.sw(), 0x63C2);
        let right = applet.process_apdu(&APDU::with_data(CLA, ins::VERIFY_PIN, 0, 0, b"1234".to_vec()));
        assert!(right.is_okay());

        let listing = applet.process_apdu(&APDU::new(CLA, ins::LIST_SECRET_HEADERS, 0, step::INIT));
        assert_eq!(listing.sw(), SW::SEQUENCE_END);
        assert_eq!(applet.get_state().logs.len(), 2);
    }

    #[test]
    fn test_satochip_rejects_secret_commands() {
        let mut applet = create_test_applet(CardType::Satochip);
        select(&mut applet, b"SatoChip");
        setup(&mut applet);
        applet.process_apdu(&APDU::with_data(CLA, ins::VERIFY_PIN, 0, 0, b"1234".to_vec()));

        let response = applet.process_apdu(&APDU::new(CLA, ins::GET_SEEDKEEPER_STATUS, 0, 0));
        assert_eq!(response.sw(), SW::INS_NOT_SUPPORTED);

        let seed = vec![0x11; 32];
        let response = applet.process_apdu(&APDU::with_data(CLA, ins::BIP32_IMPORT_SEED, 32, 0, seed));
        assert!(response.is_okay());
        assert!(applet.get_state().is_seeded);
        assert!(applet.get_state().logs.is_empty());
    }

    #[test]
    fn test_power_cycle_clears_login() {
        let mut applet = create_test_applet(CardType::Seedkeeper);
        select(&mut applet, b"SeedKeeper");
        setup(&mut applet);
        applet.process_apdu(&APDU::with_data(CLA, ins::VERIFY_PIN, 0, 0, b"1234".to_vec()));

        applet.reset();
        select(&mut applet, b"SeedKeeper");
        let response = applet.process_apdu(&APDU::new(CLA, ins::GET_SEEDKEEPER_STATUS, 0, 0));
        assert_eq!(response.sw(), SW::UNAUTHORIZED);
    }

    #[test]
    fn test_split_setup() {
        let data = [5, 2, b'a', b'b', 7, 1, b'z'];
        assert_eq!(split_setup(&data), Some((5, &b"ab"[..], 7, &b"z"[..])));
        assert_eq!(split_setup(&data[..6]), None);
    }
}
