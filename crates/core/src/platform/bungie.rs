//! Platform REST client: transfers, equips and the cached profile.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::{
    cache::LoadCache,
    config::AppConfig,
    error::MoveError,
    models::{CharacterId, ItemInstanceId},
};

use super::{
    profile::{ProfileResponse, PROFILE_COMPONENTS},
    EquipFailureReason, PlatformActions, TransferItemCall,
};

/// EquipItems refuses larger batches.
pub const EQUIP_BATCH_SIZE: usize = 10;

const ERROR_CODE_SUCCESS: i32 = 1;
const ERROR_CODE_WEB_AUTH_REQUIRED: i32 = 99;
const ERROR_CODE_ITEM_NOT_FOUND: i32 = 1623;
const ERROR_CODE_ACCESS_TOKEN_EXPIRED: i32 = 2111;

/// Per-item answer of the EquipItems action.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipItemResult {
    /// Instance the answer refers to.
    pub item_instance_id: String,
    /// Platform error code of this item; 1 means equipped.
    pub equip_status: i32,
    /// Failure bitmask, 0 when equipped.
    #[serde(default)]
    pub cannot_equip_reason: u32,
}

impl EquipItemResult {
    /// Whether the item ended up equipped.
    ///
    /// Items refused by the platform always carry a non-zero
    /// `cannotEquipReason`, so a zero bitmask counts as equipped whatever the
    /// status code says.
    pub fn is_success(&self) -> bool {
        self.equip_status == ERROR_CODE_SUCCESS || self.cannot_equip_reason == 0
    }

    /// Decoded failure bitmask.
    pub fn reason(&self) -> EquipFailureReason {
        EquipFailureReason::from_bits(self.cannot_equip_reason)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Envelope<T> {
    response: Option<T>,
    #[serde(default)]
    error_code: i32,
    #[serde(default)]
    error_status: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TransferItemBody<'a> {
    item_reference_hash: u32,
    stack_size: u32,
    transfer_to_vault: bool,
    item_id: &'a str,
    character_id: &'a str,
    membership_type: i32,
}

impl<'a> TransferItemBody<'a> {
    fn new(call: &'a TransferItemCall, membership: &Membership) -> Self {
        Self {
            item_reference_hash: call.item_hash,
            stack_size: 1,
            transfer_to_vault: call.transfer_to_vault,
            item_id: call.item_instance_id.as_str(),
            character_id: call.character_id.as_str(),
            membership_type: membership.membership_type,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EquipItemsBody<'a> {
    item_ids: Vec<&'a str>,
    character_id: &'a str,
    membership_type: i32,
}

impl<'a> EquipItemsBody<'a> {
    fn new(batch: &'a [ItemInstanceId], character_id: &'a CharacterId, membership: &Membership) -> Self {
        Self {
            item_ids: batch.iter().map(ItemInstanceId::as_str).collect(),
            character_id: character_id.as_str(),
            membership_type: membership.membership_type,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EquipItemsResponse {
    #[serde(default)]
    equip_results: Vec<EquipItemResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MembershipsResponse {
    #[serde(default)]
    destiny_memberships: Vec<DestinyMembership>,
    #[serde(default)]
    primary_membership_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DestinyMembership {
    membership_id: String,
    membership_type: i32,
}

/// Platform account every call acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Membership {
    membership_type: i32,
    membership_id: String,
}

/// Primary Destiny membership of the account, else the first one listed.
fn select_membership(memberships: MembershipsResponse) -> Result<Membership, MoveError> {
    let MembershipsResponse {
        destiny_memberships,
        primary_membership_id,
    } = memberships;
    let index = primary_membership_id
        .and_then(|primary| {
            destiny_memberships
                .iter()
                .position(|m| m.membership_id == primary)
        })
        .unwrap_or(0);
    destiny_memberships
        .into_iter()
        .nth(index)
        .map(|chosen| Membership {
            membership_type: chosen.membership_type,
            membership_id: chosen.membership_id,
        })
        .ok_or_else(|| MoveError::rejected("account has no Destiny membership"))
}

struct Http {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    access_token: Option<String>,
    membership: OnceCell<Membership>,
}

impl Http {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder, MoveError> {
        let token = self.access_token.as_deref().ok_or(MoveError::Unauthorized)?;
        Ok(builder
            .header("X-API-Key", &self.api_key)
            .bearer_auth(token))
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<Option<T>, MoveError> {
        let response = self
            .authorized(builder)?
            .send()
            .await
            .map_err(|err| MoveError::Network(err.to_string()))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| MoveError::Network(err.to_string()))?;
        decode(status, &body)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, MoveError> {
        debug!(path, "GET");
        self.send(self.client.get(self.url(path))).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Option<T>, MoveError> {
        debug!(path, "POST");
        self.send(self.client.post(self.url(path)).json(body)).await
    }

    /// Configured membership, or the account's resolved once and reused by
    /// every profile read and mutation.
    async fn membership(&self) -> Result<&Membership, MoveError> {
        self.membership
            .get_or_try_init(|| async {
                let memberships: MembershipsResponse = self
                    .get("/Platform/User/GetMembershipsForCurrentUser/")
                    .await?
                    .ok_or_else(|| MoveError::rejected("empty membership response"))?;
                let membership = select_membership(memberships)?;
                info!(
                    membership = %membership.membership_id,
                    membership_type = membership.membership_type,
                    "Membership resolved"
                );
                Ok::<_, MoveError>(membership)
            })
            .await
    }

    async fn fetch_profile(&self) -> Result<Arc<ProfileResponse>, MoveError> {
        let Membership {
            membership_type,
            membership_id,
        } = self.membership().await?;
        let path = format!(
            "/Platform/Destiny2/{membership_type}/Profile/{membership_id}/?components={PROFILE_COMPONENTS}"
        );
        let profile: ProfileResponse = self
            .get(&path)
            .await?
            .ok_or_else(|| MoveError::rejected("empty profile response"))?;
        info!(membership = %membership_id, "Profile loaded");
        Ok(Arc::new(profile))
    }
}

/// Decode a platform envelope into its `Response` payload.
fn decode<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> Result<Option<T>, MoveError> {
    if status == StatusCode::UNAUTHORIZED {
        return Err(MoveError::Unauthorized);
    }

    let envelope: Envelope<T> = match serde_json::from_slice(body) {
        Ok(envelope) => envelope,
        Err(err) if status.is_success() => {
            return Err(MoveError::Network(format!("malformed response: {err}")))
        }
        Err(_) => {
            return Err(MoveError::Rejected {
                code: i32::from(status.as_u16()),
                status: status.canonical_reason().unwrap_or("HTTP error").to_string(),
                message: String::from_utf8_lossy(body).trim().to_string(),
            })
        }
    };

    match envelope.error_code {
        ERROR_CODE_SUCCESS => Ok(envelope.response),
        ERROR_CODE_ITEM_NOT_FOUND => Err(MoveError::ItemNotFound),
        ERROR_CODE_WEB_AUTH_REQUIRED | ERROR_CODE_ACCESS_TOKEN_EXPIRED => {
            Err(MoveError::Unauthorized)
        }
        code => Err(MoveError::Rejected {
            code,
            status: envelope.error_status,
            message: envelope.message,
        }),
    }
}

/// Authenticated client for the platform's REST API.
#[derive(Clone)]
pub struct BungieClient {
    http: Arc<Http>,
    profile: LoadCache<Arc<ProfileResponse>, MoveError>,
}

impl BungieClient {
    /// Build a client from configuration.
    pub fn new(config: &AppConfig) -> Result<Self, MoveError> {
        if config.api_key.is_empty() {
            warn!("no api_key configured; platform calls will be refused");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .gzip(true)
            .build()
            .map_err(|err| MoveError::Network(err.to_string()))?;

        Ok(Self {
            http: Arc::new(Http {
                client,
                base_url: config.api_base_url.clone(),
                api_key: config.api_key.clone(),
                access_token: config.access_token.clone(),
                membership: OnceCell::new_with(config.membership_id.clone().map(
                    |membership_id| Membership {
                        membership_type: config.membership_type,
                        membership_id,
                    },
                )),
            }),
            profile: LoadCache::new(),
        })
    }

    /// Account profile, fetched once and shared until invalidated.
    pub async fn profile(&self) -> Result<Arc<ProfileResponse>, MoveError> {
        let http = Arc::clone(&self.http);
        self.profile
            .get_or_load(move || async move { http.fetch_profile().await })
            .await
    }

    /// Drop the cached profile so the next read sees fresh state.
    pub fn invalidate_profile(&self) {
        self.profile.invalidate();
    }

    /// Equip several items on one character, in batches the platform accepts.
    pub async fn equip_items(
        &self,
        character_id: &CharacterId,
        item_instance_ids: &[ItemInstanceId],
    ) -> Result<Vec<EquipItemResult>, MoveError> {
        let membership = self.http.membership().await?;
        let mut results = Vec::with_capacity(item_instance_ids.len());
        for batch in item_instance_ids.chunks(EQUIP_BATCH_SIZE) {
            debug!(character = %character_id, items = batch.len(), "equipping batch");
            let body = EquipItemsBody::new(batch, character_id, membership);
            let response: EquipItemsResponse = self
                .http
                .post("/Platform/Destiny2/Actions/Items/EquipItems/", &body)
                .await?
                .unwrap_or_default();
            results.extend(response.equip_results);
        }
        self.invalidate_profile();
        Ok(results)
    }
}

#[async_trait]
impl PlatformActions for BungieClient {
    async fn transfer_item(&self, call: TransferItemCall) -> Result<(), MoveError> {
        let membership = self.http.membership().await?;
        let body = TransferItemBody::new(&call, membership);
        let _: Option<serde_json::Value> = self
            .http
            .post("/Platform/Destiny2/Actions/Items/TransferItem/", &body)
            .await?;
        self.invalidate_profile();
        Ok(())
    }

    async fn equip_item(
        &self,
        item_instance_id: ItemInstanceId,
        character_id: CharacterId,
    ) -> Result<(), MoveError> {
        let results = self
            .equip_items(&character_id, std::slice::from_ref(&item_instance_id))
            .await?;
        let result = results
            .into_iter()
            .find(|r| r.item_instance_id == item_instance_id.as_str())
            .ok_or_else(|| MoveError::rejected("no equip result for item"))?;

        if result.is_success() {
            Ok(())
        } else {
            Err(MoveError::EquipBlocked(result.reason()))
        }
    }
}
