//! HTTP client.
//!
//! All calls except the nonce and token exchange run through the
//! [`Session`], which attaches `Authorization: Bearer` and `User-Id`
//! headers, refreshes the token ahead of expiry and retries once when the
//! server rejects it.

use std::{fmt, future::Future, sync::Arc};

use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use serde_with::{DisplayFromStr, PickFirst, serde_as};
use url::Url;

use crate::{
    Config, Error, Result, User,
    approval::decrypt_approval,
    session::{Authenticator, Session, Token},
    types::{
        AssetIdentifier, ChainId, CreateOrderRequest, InnerSettlementRequest,
        InnerWithdrawalRequest, Market, MarketQuantity, Order, SettlementApproval,
        SettlementApprovalMessage, Side, TimeInForce, TxSettlementRequest, UserPublicKey,
        WithdrawalRequest,
        orders::{CancelOrderRequest, ReplaceOrder, ReplaceOrderRequest},
    },
    ws::{ControlChannel, ControlHandler, DataStream},
};

/// Joins `path` onto `base`, keeping any path prefix of `base`.
pub(crate) fn endpoint_url(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    let joined = format!(
        "{}/{}",
        base.path().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    url.set_path(&joined);
    url
}

#[derive(Deserialize)]
struct NonceResponse {
    value: String,
}

#[derive(Serialize)]
struct AuthRequest<'a> {
    user_id: UserPublicKey,
    nonce: &'a str,
    signature: Vec<u8>,
}

#[serde_as]
#[derive(Deserialize)]
struct AuthResponse {
    token: String,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    expiry_ns: i64,
}

/// Client for the trading and clearing service.
///
/// Clones share the connection pool and the session.
#[derive(Clone)]
pub struct Client {
    http_client: reqwest::Client,
    base_url: Url,
    user: Arc<User>,
    session: Arc<Session>,
    config: Arc<Config>,
}

impl Client {
    /// Creates a client for `base_url` with default settings.
    pub fn new(user: User, base_url: Url) -> Result<Self> {
        Self::with_config(user, Config::new(base_url))
    }

    /// Fails if the HTTP client cannot be built, e.g. when no TLS backend is
    /// available.
    pub fn with_config(user: User, config: Config) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .tcp_nodelay(true)
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.base_url.clone(),
            user: Arc::new(user),
            session: Arc::new(Session::new(config.refresh_margin)),
            config: Arc::new(config),
        })
    }

    /// Creates a client that reuses `other`'s connection pool and identity
    /// but keeps its own session.
    pub fn from_client(other: &Client) -> Self {
        Self {
            http_client: other.http_client.clone(),
            base_url: other.base_url.clone(),
            user: Arc::clone(&other.user),
            session: Arc::new(Session::new(other.config.refresh_margin)),
            config: Arc::clone(&other.config),
        }
    }

    #[inline(always)]
    pub fn user(&self) -> &User {
        &self.user
    }

    #[inline(always)]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[inline(always)]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline(always)]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Returns a token valid for at least the refresh margin.
    pub async fn ensure_auth(&self) -> Result<Token> {
        self.session.ensure_auth(self).await
    }

    /// Sends an authenticated request and decodes the JSON response.
    ///
    /// An empty body or `204 No Content` decodes as `null`.
    pub async fn request<B, R>(&self, method: Method, path: &str, body: Option<&B>) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = endpoint_url(&self.base_url, path);
        let user_id = self.user.public_key().to_hex();

        let value = self
            .session
            .call(self, |token| {
                let mut req = self
                    .http_client
                    .request(method.clone(), url.clone())
                    .bearer_auth(token.value())
                    .header("User-Id", &user_id);
                if let Some(body) = body {
                    req = req.json(body);
                }
                log::debug!("{method} {url}");
                async move { read_json(req.send().await?).await }
            })
            .await?;

        Ok(serde_json::from_value(value)?)
    }

    #[inline(always)]
    pub async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        self.request::<(), R>(Method::GET, path, None).await
    }

    #[inline(always)]
    pub async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R> {
        self.request(Method::POST, path, Some(body)).await
    }

    /// Market definition for `asset`.
    pub async fn get_market(&self, asset: &AssetIdentifier) -> Result<Market> {
        self.get(&format!("/market/{asset}")).await
    }

    /// Order book snapshot for `asset`.
    pub async fn get_orderbook_snapshot(&self, asset: &AssetIdentifier) -> Result<Value> {
        self.get(&format!("/marketdepth/{asset}")).await
    }

    /// The user's inventory.
    pub async fn get_inventory(&self) -> Result<Value> {
        self.get(&format!("/inventory/user/{}", self.user.public_key()))
            .await
    }

    /// The user's orders.
    pub async fn get_user_orders(&self) -> Result<Value> {
        self.get(&format!("/orders/user/{}", self.user.public_key()))
            .await
    }

    /// The user's trades.
    pub async fn get_user_trades(&self) -> Result<Value> {
        self.get(&format!("/trades/user/{}", self.user.public_key()))
            .await
    }

    /// Settlement signatures issued to `user`.
    pub async fn get_settlement_signatures(&self, user: &UserPublicKey) -> Result<Value> {
        self.get(&format!("/settlement/signatures/{user}")).await
    }

    /// Asks the clearing engine to approve an atomic settlement.
    ///
    /// The approval arrives on [`Client::stream_settlement_approvals`] and the
    /// signatures through [`Client::get_settlement_signatures`].
    pub async fn init_settlement(&self, settlement: InnerSettlementRequest) -> Result<Value> {
        let request = TxSettlementRequest::new(&self.user, settlement)?;
        self.post("/settlement/init", &request).await
    }

    /// Starts a withdrawal. Signatures for completing it on-chain are
    /// returned by [`Client::get_withdrawal_signatures`].
    pub async fn init_withdrawal(&self, withdrawal: InnerWithdrawalRequest) -> Result<Value> {
        let request = WithdrawalRequest::new(&self.user, withdrawal)?;
        self.post("/withdrawal/init", &request).await
    }

    /// Withdrawal signatures issued to `user`.
    pub async fn get_withdrawal_signatures(&self, user: &UserPublicKey) -> Result<Value> {
        self.get(&format!("/withdrawal/signatures/{user}")).await
    }

    /// Asks the clearing engine to pick up completed withdrawals on `chain_id`.
    pub async fn update_withdrawals(&self, chain_id: ChainId) -> Result<Value> {
        self.post(
            "/withdrawal/update",
            &json!({ "user": self.user.public_key(), "chain": chain_id }),
        )
        .await
    }

    /// Asks the clearing engine to rescan the deposit vault on `chain_id`.
    pub async fn update_vault_balance(
        &self,
        asset: &AssetIdentifier,
        chain_id: ChainId,
    ) -> Result<Value> {
        self.post(
            "/vault/balance/update",
            &json!({ "asset_id": asset, "chain_id": chain_id }),
        )
        .await
    }

    /// Signs and submits `order`.
    pub async fn submit_order(&self, order: Order) -> Result<Value> {
        let request = CreateOrderRequest::new(&self.user, order)?;
        log::debug!(
            "creating order {} on {}",
            request.order.order_id,
            request.order.base_asset
        );
        self.post("/orders/create", &request).await
    }

    /// Places a limit order on `asset`'s book.
    ///
    /// `price` and `quantity` are in book units; the book decimals are looked
    /// up with [`Client::get_market`].
    pub async fn create_limit_order(
        &self,
        asset: &AssetIdentifier,
        side: Side,
        price: u64,
        quantity: u64,
        time_in_force: TimeInForce,
    ) -> Result<Value> {
        let market = self.get_market(asset).await?;
        let order = Order::limit(
            self.user.public_key(),
            &market,
            side,
            price,
            quantity,
            time_in_force,
        );
        self.submit_order(order).await
    }

    /// Places a market order on `asset`'s book.
    pub async fn create_market_order(
        &self,
        asset: &AssetIdentifier,
        side: Side,
        quantity: MarketQuantity,
        fill_or_kill: bool,
    ) -> Result<Value> {
        let market = self.get_market(asset).await?;
        let order = Order::market(self.user.public_key(), &market, side, quantity, fill_or_kill);
        self.submit_order(order).await
    }

    /// Signs and submits a cancel over HTTP.
    pub async fn cancel_order(
        &self,
        order_id: impl Into<String>,
        asset_id: AssetIdentifier,
    ) -> Result<Value> {
        let request = CancelOrderRequest::new(&self.user, order_id, asset_id)?;
        self.request(Method::DELETE, "/orders/cancel", Some(&request))
            .await
    }

    /// Signs and submits a replace over HTTP.
    pub async fn replace_order(
        &self,
        replace: ReplaceOrder,
        asset_id: AssetIdentifier,
    ) -> Result<Value> {
        let request = ReplaceOrderRequest::new(&self.user, replace, asset_id)?;
        self.request(Method::PATCH, "/orders/replace", Some(&request))
            .await
    }

    /// Opens a data stream at `path`, decoding frames with `parser`.
    pub async fn stream<T, P>(&self, path: &str, parser: P) -> Result<DataStream<T>>
    where
        T: Send + 'static,
        P: Fn(Value) -> anyhow::Result<T> + Send + 'static,
    {
        DataStream::open(self.clone(), path, parser, None).await
    }

    /// Like [`Client::stream`], handing control frames to `control`.
    pub async fn stream_with_control<T, P>(
        &self,
        path: &str,
        parser: P,
        control: ControlHandler,
    ) -> Result<DataStream<T>>
    where
        T: Send + 'static,
        P: Fn(Value) -> anyhow::Result<T> + Send + 'static,
    {
        DataStream::open(self.clone(), path, parser, Some(control)).await
    }

    /// Order events.
    pub async fn stream_orders(&self) -> Result<DataStream<Value>> {
        self.stream("/orders", Ok).await
    }

    /// Public trades.
    pub async fn stream_trades(&self) -> Result<DataStream<Value>> {
        self.stream("/trades", Ok).await
    }

    /// Order book diffs for `asset`.
    pub async fn stream_depth(&self, asset: &AssetIdentifier) -> Result<DataStream<Value>> {
        self.stream(&format!("/marketdepth/diff/{asset}"), Ok)
            .await
    }

    /// Settlement approvals addressed to this user, decrypted.
    ///
    /// Approvals that fail to decrypt are yielded as errors.
    pub async fn stream_settlement_approvals(
        &self,
    ) -> Result<DataStream<Result<SettlementApproval>>> {
        let user = Arc::clone(&self.user);
        let path = format!("/settlement/approvals/{}", user.public_key());
        self.stream(&path, move |value| {
            let message: SettlementApprovalMessage = serde_json::from_value(value)?;
            Ok(decrypt_approval(&message, user.signing_key()))
        })
        .await
    }

    /// Opens the order-control channel.
    pub async fn control_channel(&self) -> Result<ControlChannel> {
        ControlChannel::open(self.clone(), "/control").await
    }
}

impl Authenticator for Client {
    fn authenticate(&self) -> impl Future<Output = Result<Token>> + Send {
        async move {
            let public_key = self.user.public_key();

            let nonce: NonceResponse = read_typed(
                self.http_client
                    .get(endpoint_url(&self.base_url, &format!("/nonce/{public_key}")))
                    .send()
                    .await?,
            )
            .await
            .map_err(|err| Error::AuthenticationFailure(format!("fetching nonce: {err}")))?;

            let request = AuthRequest {
                user_id: public_key,
                nonce: &nonce.value,
                signature: self.user.sign(&nonce.value),
            };
            let auth: AuthResponse = read_typed(
                self.http_client
                    .post(endpoint_url(&self.base_url, "/auth"))
                    .json(&request)
                    .send()
                    .await?,
            )
            .await
            .map_err(|err| Error::AuthenticationFailure(format!("exchanging nonce: {err}")))?;

            Ok(Token::new(auth.token, auth.expiry_ns))
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url.as_str())
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

async fn read_json(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    let url = resp.url().clone();
    let body = resp.text().await?;

    if !status.is_success() {
        log::error!("http error {status} while requesting {url}: {body}");
        return Err(Error::Status { status, body });
    }
    if status == StatusCode::NO_CONTENT || body.trim().is_empty() {
        return Ok(Value::Null);
    }

    Ok(serde_json::from_str(&body)?)
}

async fn read_typed<R: DeserializeOwned>(resp: reqwest::Response) -> Result<R> {
    Ok(serde_json::from_value(read_json(resp).await?)?)
}
