//! Централизованная конфигурация ядра
//!
//! Все размеры ключей и параметры генерации определены здесь,
//! чтобы избежать хардкода по движкам и менеджеру сессий.

use std::sync::OnceLock;

/// Глобальная конфигурация (синглтон)
static GLOBAL_CONFIG: OnceLock<Config> = OnceLock::new();

/// Наименьший модуль, при котором блок RSA несёт хотя бы один байт сообщения
pub const MIN_MODULUS_BITS: usize = 17;

/// Основная структура конфигурации
#[derive(Debug, Clone)]
pub struct Config {
    // ============================================
    // RSA
    // ============================================

    /// Размер модуля по умолчанию для `Session::with_default_key_size` (в битах)
    pub default_rsa_bits: usize,

    /// Минимальный размер модуля (в битах)
    pub min_rsa_bits: usize,

    /// Максимальный размер модуля (в битах)
    pub max_rsa_bits: usize,

    /// Публичная экспонента
    pub public_exponent: u32,

    /// Количество раундов Miller-Rabin при проверке кандидатов в простые
    pub primality_rounds: usize,

    // ============================================
    // СИММЕТРИЧНЫЙ ШИФР
    // ============================================

    /// Размер симметричного ключа, который генерирует отвечающая сторона (в битах)
    pub default_symmetric_bits: usize,

    /// Максимальный размер симметричного ключа (в битах)
    pub max_symmetric_bits: usize,
}

impl Config {
    /// Создать конфигурацию с дефолтными значениями
    pub fn default() -> Self {
        Self {
            default_rsa_bits: 2048,
            min_rsa_bits: 64,
            max_rsa_bits: 16384,
            public_exponent: 65537,
            primality_rounds: 20,

            default_symmetric_bits: 256,
            max_symmetric_bits: 1 << 30, // 1 gigabit
        }
    }

    /// Создать конфигурацию из переменных окружения
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("RSAES_DEFAULT_RSA_BITS") {
            if let Ok(parsed) = val.parse() {
                config.default_rsa_bits = parsed;
            }
        }

        if let Ok(val) = std::env::var("RSAES_DEFAULT_SYMMETRIC_BITS") {
            if let Ok(parsed) = val.parse() {
                config.default_symmetric_bits = parsed;
            }
        }

        if let Ok(val) = std::env::var("RSAES_PRIMALITY_ROUNDS") {
            if let Ok(parsed) = val.parse() {
                config.primality_rounds = parsed;
            }
        }

        config
    }

    /// Smallest modulus width that carries one message byte per block and
    /// stays strictly above the public exponent.
    pub fn rsa_bits_floor(&self) -> usize {
        let exponent_bits = (u32::BITS - self.public_exponent.leading_zeros()) as usize;
        MIN_MODULUS_BITS.max(exponent_bits + 1)
    }

    /// Проверить согласованность значений
    ///
    /// # Errors
    ///
    /// Возвращает описание первого нарушенного ограничения
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.public_exponent <= 1 || self.public_exponent % 2 == 0 {
            return Err("public_exponent must be odd and greater than 1");
        }
        if self.min_rsa_bits < self.rsa_bits_floor() {
            return Err("min_rsa_bits is below the modulus floor for this exponent");
        }
        if self.min_rsa_bits > self.default_rsa_bits || self.default_rsa_bits > self.max_rsa_bits {
            return Err("RSA bounds must satisfy min <= default <= max");
        }
        if self.primality_rounds == 0 {
            return Err("primality_rounds must be positive");
        }
        if self.max_symmetric_bits < 8 {
            return Err("max_symmetric_bits must allow at least one byte");
        }
        if self.default_symmetric_bits == 0
            || self.default_symmetric_bits % 8 != 0
            || self.default_symmetric_bits > self.max_symmetric_bits
        {
            return Err("default_symmetric_bits must be a positive multiple of 8 up to the maximum");
        }
        Ok(())
    }

    /// Получить глобальный экземпляр конфигурации
    ///
    /// Автоматически инициализирует конфигурацию со значениями по умолчанию при первом вызове
    pub fn global() -> &'static Config {
        GLOBAL_CONFIG.get_or_init(Config::default)
    }

    /// Инициализировать глобальную конфигурацию со значениями по умолчанию
    ///
    /// # Errors
    ///
    /// Возвращает ошибку, если конфигурация уже была инициализирована
    pub fn init() -> Result<(), &'static str> {
        GLOBAL_CONFIG
            .set(Self::default())
            .map_err(|_| "Config already initialized")
    }

    /// Инициализировать глобальную конфигурацию из переменных окружения
    ///
    /// # Errors
    ///
    /// Возвращает ошибку, если конфигурация уже была инициализирована
    /// или не проходит [`Config::validate`]
    pub fn init_from_env() -> Result<(), &'static str> {
        let config = Self::from_env();
        config.validate()?;
        GLOBAL_CONFIG
            .set(config)
            .map_err(|_| "Config already initialized")
    }

    /// Инициализировать глобальную конфигурацию с кастомным экземпляром
    ///
    /// # Errors
    ///
    /// Возвращает ошибку, если конфигурация уже была инициализирована
    /// или не проходит [`Config::validate`]
    pub fn init_with(config: Config) -> Result<(), &'static str> {
        config.validate()?;
        GLOBAL_CONFIG
            .set(config)
            .map_err(|_| "Config already initialized")
    }

    /// Проверить, инициализирована ли глобальная конфигурация
    pub fn is_initialized() -> bool {
        GLOBAL_CONFIG.get().is_some()
    }
}
