//! 钱包登记服务

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    domain::{Network, Wallet},
    error::AppError,
    repository::{CreateWalletParams, WalletRepository},
    utils::AddressValidator,
};

/// 钱包名称最大长度
const MAX_NAME_LEN: usize = 100;

pub struct WalletService {
    repo: Arc<dyn WalletRepository>,
}

impl WalletService {
    pub fn new(repo: Arc<dyn WalletRepository>) -> Self {
        Self { repo }
    }

    /// 校验地址、规范化后入库；同一用户同网络重复地址返回冲突
    pub async fn create_wallet(
        &self,
        user_id: Uuid,
        network: Network,
        address: &str,
        name: Option<String>,
    ) -> Result<Wallet, AppError> {
        if !AddressValidator::validate(network, address) {
            return Err(AppError::invalid_address(format!(
                "Invalid {} address",
                network.display_name()
            )));
        }

        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        if name.as_ref().is_some_and(|n| n.chars().count() > MAX_NAME_LEN) {
            return Err(AppError::validation_failed(format!(
                "Wallet name must be at most {} characters",
                MAX_NAME_LEN
            )));
        }

        let params = CreateWalletParams {
            user_id,
            network,
            address: AddressValidator::normalize(network, address),
            name,
        };

        match self.repo.create(params).await? {
            Some(wallet) => {
                tracing::info!(
                    user_id = %user_id,
                    wallet_id = %wallet.id,
                    network = %network,
                    "Wallet created"
                );
                Ok(wallet)
            }
            None => Err(AppError::wallet_already_exists(
                "This wallet is already being tracked",
            )),
        }
    }

    /// 删除钱包（快照随之删除）；不属于该用户按不存在处理
    pub async fn delete_wallet(&self, user_id: Uuid, wallet_id: Uuid) -> Result<(), AppError> {
        let owned = self
            .repo
            .find_by_id(wallet_id)
            .await?
            .is_some_and(|w| w.user_id == user_id);
        if !owned || !self.repo.delete(wallet_id).await? {
            return Err(AppError::wallet_not_found("Wallet not found"));
        }

        tracing::info!(user_id = %user_id, wallet_id = %wallet_id, "Wallet deleted");
        Ok(())
    }

    pub async fn list_wallets(&self, user_id: Uuid) -> Result<Vec<Wallet>, AppError> {
        Ok(self.repo.list_by_user(user_id).await?)
    }

    pub async fn list_all_wallets(&self) -> Result<Vec<Wallet>, AppError> {
        Ok(self.repo.list_all().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::AppErrorCode, repository::memory::InMemoryWalletRepository};

    const EVM: &str = "0x52908400098527886E0F7030069857D2E4169EE7";

    fn service() -> WalletService {
        WalletService::new(Arc::new(InMemoryWalletRepository::new()))
    }

    #[tokio::test]
    async fn test_create_normalizes_evm_address() {
        let service = service();
        let user = Uuid::new_v4();

        let wallet = service
            .create_wallet(user, Network::Ethereum, EVM, Some("  Main  ".into()))
            .await
            .unwrap();
        assert_eq!(wallet.address, EVM.to_lowercase());
        assert_eq!(wallet.name.as_deref(), Some("Main"));

        // 大小写不同视为同一地址
        let err = service
            .create_wallet(user, Network::Ethereum, &EVM.to_lowercase(), None)
            .await
            .unwrap_err();
        assert_eq!(err.code, AppErrorCode::WalletAlreadyExists);

        // 另一用户可以跟踪同一地址
        assert!(service
            .create_wallet(Uuid::new_v4(), Network::Ethereum, EVM, None)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_invalid_address_rejected() {
        let err = service()
            .create_wallet(Uuid::new_v4(), Network::Solana, "0x1234", None)
            .await
            .unwrap_err();
        assert_eq!(err.code, AppErrorCode::InvalidAddress);
    }

    #[tokio::test]
    async fn test_delete_enforces_ownership() {
        let service = service();
        let owner = Uuid::new_v4();
        let wallet = service
            .create_wallet(owner, Network::Base, EVM, None)
            .await
            .unwrap();

        let err = service
            .delete_wallet(Uuid::new_v4(), wallet.id)
            .await
            .unwrap_err();
        assert_eq!(err.code, AppErrorCode::WalletNotFound);

        service.delete_wallet(owner, wallet.id).await.unwrap();
        assert!(service.list_wallets(owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_all_spans_users() {
        let service = service();
        service
            .create_wallet(Uuid::new_v4(), Network::Ethereum, EVM, None)
            .await
            .unwrap();
        service
            .create_wallet(
                Uuid::new_v4(),
                Network::Bitcoin,
                "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq",
                None,
            )
            .await
            .unwrap();

        assert_eq!(service.list_all_wallets().await.unwrap().len(), 2);
    }
}
