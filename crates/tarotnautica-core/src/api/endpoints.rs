//! Typed wrappers for the endpoints the app uses.
//!
//! Login and registration go out unauthenticated; everything else goes
//! through `execute`, so it gets token refresh and the failure breaker.

use reqwest::Url;
use tracing::{info, warn};

use super::client::{ApiClient, RequestOptions};
use super::{ApiError, ApiResponse};
use crate::models::{
    CatalogItem, GemBalance, GemPurchase, LoginRequest, OwnedPotions, OwnedSpells, PotionPurchase, Profile,
    PurchaseOutcome, PurchaseReply, Reading, ReadingRequest, ReadingResult, ReadingType, Registration,
    RegistrationErrors, SpellPurchase, TokenPair,
};

pub const TOKEN_PATH: &str = "/api/token/";
pub const REGISTER_PATH: &str = "/api/registro/";
pub const PROFILE_PATH: &str = "/api/perfil/";
pub const BUY_GEMS_PATH: &str = "/api/comprar-gemas/";
pub const ACTIVATE_SUBSCRIPTION_PATH: &str = "/api/activar-suscripcion/";
pub const CANCEL_SUBSCRIPTION_PATH: &str = "/api/cancelar-suscripcion/";
pub const READING_TYPES_PATH: &str = "/api/listar-tipos-tirada/";
pub const READING_HISTORY_PATH: &str = "/api/historial-tiradas/";
pub const PERFORM_READING_PATH: &str = "/api/realizar-tirada/";
pub const SPELLS_PATH: &str = "/api/hechizos/";
pub const OWNED_SPELLS_PATH: &str = "/api/mis-hechizos/";
pub const BUY_SPELL_PATH: &str = "/api/comprar-hechizo/";
pub const POTIONS_PATH: &str = "/api/pociones/";
pub const OWNED_POTIONS_PATH: &str = "/api/mis-pociones/";
pub const BUY_POTION_PATH: &str = "/api/comprar-pocion/";

/// A 400 carrying a message is a business rule the user can act on
/// (not enough gems, no subscription); anything else maps by status.
fn check_business_rule(response: ApiResponse) -> Result<ApiResponse, ApiError> {
    if response.status == 400 {
        if let Some(message) = response.message() {
            return Err(ApiError::Validation(message));
        }
    }
    response.error_for_status()
}

impl ApiClient {
    // ===== Account =====

    /// Exchange credentials for a token pair and store it.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), ApiError> {
        let response = self.post_public(TOKEN_PATH, &LoginRequest { email, password }).await;
        if !response.ok {
            warn!(status = response.status, "Login rejected");
            return Err(match response.status {
                400 | 401 => ApiError::Unauthorized(
                    response
                        .message()
                        .unwrap_or_else(|| "Invalid credentials".to_string()),
                ),
                _ => match response.error_for_status() {
                    Err(e) => e,
                    Ok(_) => ApiError::InvalidResponse("Unexpected login response".to_string()),
                },
            });
        }

        let pair: TokenPair = response.json()?;
        self.store()
            .store_pair(&pair.access, &pair.refresh)
            .map_err(|e| ApiError::Storage(e.to_string()))?;
        self.record_success();
        info!("Logged in");
        Ok(())
    }

    /// Create an account. Field errors come back as `ApiError::Validation`.
    pub async fn register(&self, email: &str, password: &str, password2: &str) -> Result<(), ApiError> {
        let body = Registration {
            email,
            password,
            password2,
        };
        let response = self.post_public(REGISTER_PATH, &body).await;
        if response.ok {
            info!("Account registered");
            return Ok(());
        }

        if response.status == 400 {
            let errors: RegistrationErrors = response.json().unwrap_or_default();
            let message = errors
                .first_message()
                .unwrap_or("Registration failed")
                .to_string();
            return Err(ApiError::Validation(message));
        }
        response.error_for_status().map(|_| ())
    }

    /// Forget the stored tokens. The caller takes care of navigation.
    pub fn logout(&self) -> Result<(), ApiError> {
        self.store()
            .clear()
            .map_err(|e| ApiError::Storage(e.to_string()))?;
        self.reset_failures();
        info!("Logged out");
        Ok(())
    }

    // ===== Data Fetching Methods =====

    pub async fn fetch_profile(&self) -> Result<Profile, ApiError> {
        self.execute(PROFILE_PATH, RequestOptions::get())
            .await
            .error_for_status()?
            .json()
    }

    /// Buy `amount` gems; returns the new balance.
    pub async fn buy_gems(&self, amount: u32) -> Result<GemBalance, ApiError> {
        let options = RequestOptions::post().json(&GemPurchase { amount })?;
        self.execute(BUY_GEMS_PATH, options)
            .await
            .error_for_status()?
            .json()
    }

    pub async fn activate_subscription(&self) -> Result<(), ApiError> {
        self.execute(ACTIVATE_SUBSCRIPTION_PATH, RequestOptions::post())
            .await
            .error_for_status()
            .map(|_| ())
    }

    pub async fn cancel_subscription(&self) -> Result<(), ApiError> {
        self.execute(CANCEL_SUBSCRIPTION_PATH, RequestOptions::post())
            .await
            .error_for_status()
            .map(|_| ())
    }

    // ===== Readings =====

    pub async fn fetch_reading_types(&self) -> Result<Vec<ReadingType>, ApiError> {
        let types: Option<Vec<ReadingType>> = self
            .execute(READING_TYPES_PATH, RequestOptions::get())
            .await
            .error_for_status()?
            .json()?;
        Ok(types.unwrap_or_default())
    }

    pub async fn fetch_reading_history(&self) -> Result<Vec<Reading>, ApiError> {
        let history: Option<Vec<Reading>> = self
            .execute(READING_HISTORY_PATH, RequestOptions::get())
            .await
            .error_for_status()?
            .json()?;
        Ok(history.unwrap_or_default())
    }

    /// Draw a reading of type `reading_type` (a `ReadingType::id`).
    pub async fn perform_reading(&self, reading_type: i64, question: &str) -> Result<ReadingResult, ApiError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ApiError::Validation("Enter a question for the reading".to_string()));
        }
        let options = RequestOptions::post().json(&ReadingRequest {
            reading_type,
            question,
        })?;
        let response = self.execute(PERFORM_READING_PATH, options).await;
        let result: ReadingResult = check_business_rule(response)?.json()?;
        info!(reading_type, cards = result.reading.cards.len(), "Reading performed");
        Ok(result)
    }

    // ===== Spells and potions =====

    pub async fn fetch_spells(&self, category: &str) -> Result<Vec<CatalogItem>, ApiError> {
        let endpoint = self.with_category(SPELLS_PATH, category)?;
        self.execute(&endpoint, RequestOptions::get())
            .await
            .error_for_status()?
            .json()
    }

    /// Ids of the spells this account owns.
    pub async fn fetch_owned_spells(&self) -> Result<Vec<i64>, ApiError> {
        let owned: OwnedSpells = self
            .execute(OWNED_SPELLS_PATH, RequestOptions::get())
            .await
            .error_for_status()?
            .json()?;
        Ok(owned.ids)
    }

    pub async fn buy_spell(&self, spell_id: i64) -> Result<PurchaseOutcome, ApiError> {
        let options = RequestOptions::post().json(&SpellPurchase { spell_id })?;
        let reply: PurchaseReply = check_business_rule(self.execute(BUY_SPELL_PATH, options).await)?.json()?;
        Ok(reply.into())
    }

    pub async fn fetch_potions(&self, category: &str) -> Result<Vec<CatalogItem>, ApiError> {
        let endpoint = self.with_category(POTIONS_PATH, category)?;
        self.execute(&endpoint, RequestOptions::get())
            .await
            .error_for_status()?
            .json()
    }

    /// Ids of the potions this account owns.
    pub async fn fetch_owned_potions(&self) -> Result<Vec<i64>, ApiError> {
        let owned: OwnedPotions = self
            .execute(OWNED_POTIONS_PATH, RequestOptions::get())
            .await
            .error_for_status()?
            .json()?;
        Ok(owned.ids)
    }

    /// Potions require an active subscription; the server enforces it.
    pub async fn buy_potion(&self, potion_id: i64) -> Result<PurchaseOutcome, ApiError> {
        let options = RequestOptions::post().json(&PotionPurchase { potion_id })?;
        let reply: PurchaseReply = check_business_rule(self.execute(BUY_POTION_PATH, options).await)?.json()?;
        Ok(reply.into())
    }

    /// `path?categoria=<category>`, with the category query-encoded.
    fn with_category(&self, path: &str, category: &str) -> Result<String, ApiError> {
        let url = Url::parse_with_params(&self.url(path), &[("categoria", category)])
            .map_err(|e| ApiError::InvalidRequest(format!("Invalid URL: {}", e)))?;
        Ok(format!("{}?{}", path, url.query().unwrap_or_default()))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;

    use crate::auth::{MemoryTokenStore, TokenKind, TokenStore, REFRESH_PATH};
    use crate::config::AuthPolicy;
    use crate::models::ReadingKind;
    use crate::test_support::{FakeTransport, Reply, BASE_URL};

    fn client(transport: FakeTransport, store: &Arc<MemoryTokenStore>) -> (ApiClient, Arc<FakeTransport>) {
        let transport = Arc::new(transport);
        let client = ApiClient::with_transport(BASE_URL, transport.clone(), store.clone(), AuthPolicy::default());
        (client, transport)
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_stores_token_pair() {
        let store = Arc::new(MemoryTokenStore::new());
        let (client, transport) = client(
            FakeTransport::new(|_| Reply::json(200, json!({"access": "tokA1", "refresh": "tokR1"}))),
            &store,
        );

        client.login("vidente@tarotnautica.app", "secreto").await.unwrap();

        assert_eq!(store.get(TokenKind::Access).as_deref(), Some("tokA1"));
        assert_eq!(store.get(TokenKind::Refresh).as_deref(), Some("tokR1"));
        let sent = &transport.requests_to(TOKEN_PATH)[0];
        assert_eq!(sent.authorization(), None);
        assert_eq!(
            sent.json_body(),
            Some(json!({"email": "vidente@tarotnautica.app", "password": "secreto"}))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_with_bad_credentials() {
        let store = Arc::new(MemoryTokenStore::new());
        let (client, _) = client(
            FakeTransport::new(|_| {
                Reply::json(401, json!({"detail": "No active account found with the given credentials"}))
            }),
            &store,
        );

        let err = client.login("a@b.c", "wrong").await.unwrap_err();
        assert_eq!(
            err,
            ApiError::Unauthorized("No active account found with the given credentials".into())
        );
        assert_eq!(store.get(TokenKind::Access), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_surfaces_first_field_error() {
        let store = Arc::new(MemoryTokenStore::new());
        let (client, _) = client(
            FakeTransport::new(|_| {
                Reply::json(400, json!({"email": ["Ya existe un usuario con este correo."]}))
            }),
            &store,
        );

        let err = client.register("a@b.c", "pw123456", "pw123456").await.unwrap_err();
        assert_eq!(err, ApiError::Validation("Ya existe un usuario con este correo.".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_clears_tokens() {
        let store = Arc::new(MemoryTokenStore::with_tokens("tokA1", "tokR1"));
        let (client, transport) = client(FakeTransport::new(|_| Reply::json(200, json!({}))), &store);

        client.logout().unwrap();

        assert_eq!(store.get(TokenKind::Access), None);
        assert_eq!(store.get(TokenKind::Refresh), None);
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_profile_after_refresh() {
        let store = Arc::new(MemoryTokenStore::with_tokens("tokA1", "tokR1"));
        let (client, _) = client(
            FakeTransport::routes(|path, req, _| match path {
                REFRESH_PATH => Reply::json(200, json!({"access": "tokA2"})),
                PROFILE_PATH if req.authorization() == Some("Bearer tokA2") => Reply::json(
                    200,
                    json!({"gemas": 42, "tiene_suscripcion": true, "tiradas_basicas_usadas": 4}),
                ),
                _ => Reply::json(401, json!({})),
            }),
            &store,
        );

        let profile = client.fetch_profile().await.unwrap();
        assert_eq!(profile.gems, 42);
        assert_eq!(profile.readings_remaining(ReadingKind::Basic), 96);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_profile_without_session() {
        let store = Arc::new(MemoryTokenStore::new());
        let (client, _) = client(FakeTransport::new(|_| Reply::json(200, json!({}))), &store);

        assert_eq!(client.fetch_profile().await.unwrap_err(), ApiError::SessionExpired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_buy_gems_returns_new_balance() {
        let store = Arc::new(MemoryTokenStore::with_tokens("tokA1", "tokR1"));
        let (client, transport) = client(
            FakeTransport::new(|_| Reply::json(200, json!({"gemas": 142}))),
            &store,
        );

        let balance = client.buy_gems(100).await.unwrap();
        assert_eq!(balance, GemBalance { gems: 142 });
        let sent = &transport.requests_to(BUY_GEMS_PATH)[0];
        assert_eq!(sent.json_body(), Some(json!({"cantidad": 100})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscription_endpoints() {
        let store = Arc::new(MemoryTokenStore::with_tokens("tokA1", "tokR1"));
        let (client, transport) = client(
            FakeTransport::routes(|path, _, _| match path {
                ACTIVATE_SUBSCRIPTION_PATH => Reply::json(200, json!({"mensaje": "ok"})),
                _ => Reply::json(400, json!({"detail": "No tienes una suscripción activa."})),
            }),
            &store,
        );

        client.activate_subscription().await.unwrap();
        let err = client.cancel_subscription().await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse(msg) if msg.contains("suscripción")));
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reading_types_and_empty_history() {
        let store = Arc::new(MemoryTokenStore::with_tokens("tokA1", "tokR1"));
        let (client, _) = client(
            FakeTransport::routes(|path, _, _| match path {
                READING_TYPES_PATH => Reply::json(
                    200,
                    json!([{"id": 2, "nombre": "Tirada de Claridad", "tipo": "claridad", "costo_gemas": 10}]),
                ),
                READING_HISTORY_PATH => Reply::json(200, json!(null)),
                _ => Reply::json(404, json!({})),
            }),
            &store,
        );

        let types = client.fetch_reading_types().await.unwrap();
        assert_eq!(types.len(), 1);
        assert_eq!(types[0].reading_kind(), Some(ReadingKind::Clarity));
        assert!(client.fetch_reading_history().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_perform_reading_sends_trimmed_question() {
        let store = Arc::new(MemoryTokenStore::with_tokens("tokA1", "tokR1"));
        let (client, transport) = client(
            FakeTransport::new(|_| {
                Reply::json(
                    200,
                    json!({
                        "mensaje": "Tirada realizada",
                        "tirada": {"tipo_tirada_nombre": "Tirada Básica", "cartas": [{"carta_nombre": "El Mago"}]}
                    }),
                )
            }),
            &store,
        );

        let result = client.perform_reading(1, "  ¿Volverá?  ").await.unwrap();
        assert_eq!(result.message.as_deref(), Some("Tirada realizada"));
        assert_eq!(result.reading.cards[0].name, "El Mago");
        let sent = &transport.requests_to(PERFORM_READING_PATH)[0];
        assert_eq!(sent.json_body(), Some(json!({"tipo_tirada": 1, "pregunta": "¿Volverá?"})));

        let err = client.perform_reading(1, "   ").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_perform_reading_without_gems() {
        let store = Arc::new(MemoryTokenStore::with_tokens("tokA1", "tokR1"));
        let (client, _) = client(
            FakeTransport::new(|_| Reply::json(400, json!({"error": "No tienes suficientes gemas"}))),
            &store,
        );

        let err = client.perform_reading(3, "¿Y el trabajo?").await.unwrap_err();
        assert_eq!(err, ApiError::Validation("No tienes suficientes gemas".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_catalog_queries_carry_category() {
        let store = Arc::new(MemoryTokenStore::with_tokens("tokA1", "tokR1"));
        let (client, transport) = client(
            FakeTransport::routes(|path, _, _| match path {
                SPELLS_PATH | POTIONS_PATH => {
                    Reply::json(200, json!([{"id": 3, "titulo": "Lazo de luna", "precio_gemas": 20}]))
                }
                OWNED_SPELLS_PATH => Reply::json(200, json!({"hechizos_comprados": [3]})),
                OWNED_POTIONS_PATH => Reply::json(200, json!({"pociones_compradas": []})),
                _ => Reply::json(404, json!({})),
            }),
            &store,
        );

        let spells = client.fetch_spells("amor").await.unwrap();
        assert_eq!(spells[0].title, "Lazo de luna");
        client.fetch_potions("luna llena").await.unwrap();
        assert_eq!(client.fetch_owned_spells().await.unwrap(), vec![3]);
        assert!(client.fetch_owned_potions().await.unwrap().is_empty());

        let spell_url = &transport.requests_to(SPELLS_PATH)[0].request.url;
        assert_eq!(spell_url, &format!("{}{}?categoria=amor", BASE_URL, SPELLS_PATH));
        let potion_url = &transport.requests_to(POTIONS_PATH)[0].request.url;
        assert!(potion_url.ends_with("?categoria=luna+llena"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_buy_spell_survives_token_refresh() {
        let store = Arc::new(MemoryTokenStore::with_tokens("tokA1", "tokR1"));
        let (client, transport) = client(
            FakeTransport::routes(|path, req, _| match path {
                REFRESH_PATH => Reply::json(200, json!({"access": "tokA2"})),
                BUY_SPELL_PATH if req.authorization() == Some("Bearer tokA2") => {
                    Reply::json(200, json!({"mensaje": "Compra realizada", "gemas_restantes": 15}))
                }
                _ => Reply::json(401, json!({})),
            }),
            &store,
        );

        let outcome = client.buy_spell(3).await.unwrap();

        assert_eq!(outcome, PurchaseOutcome::Purchased { gems_remaining: Some(15) });
        assert_eq!(transport.requests_to(REFRESH_PATH).len(), 1);
        let purchases = transport.requests_to(BUY_SPELL_PATH);
        assert_eq!(purchases.len(), 2);
        assert!(purchases.iter().all(|p| p.json_body() == Some(json!({"hechizo_id": 3}))));
        assert_eq!(client.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_buy_potion_already_owned_after_refresh() {
        let store = Arc::new(MemoryTokenStore::with_tokens("tokA1", "tokR1"));
        let (client, transport) = client(
            FakeTransport::routes(|path, req, _| match path {
                REFRESH_PATH => Reply::json(200, json!({"access": "tokA2"})),
                BUY_POTION_PATH if req.authorization() == Some("Bearer tokA2") => Reply::json(
                    200,
                    json!({"status": "ya_comprado", "mensaje": "Ya tienes esta poción"}),
                ),
                _ => Reply::json(401, json!({})),
            }),
            &store,
        );

        let outcome = client.buy_potion(8).await.unwrap();

        assert_eq!(
            outcome,
            PurchaseOutcome::AlreadyOwned {
                message: Some("Ya tienes esta poción".into())
            }
        );
        let retried = &transport.requests_to(BUY_POTION_PATH)[1];
        assert_eq!(retried.json_body(), Some(json!({"pocion_id": 8})));
    }
}
