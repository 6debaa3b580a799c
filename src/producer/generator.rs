//! Synthetic sales generator.
//!
//! Produces plausible sales from fixed catalogues: ten product categories
//! with five products and a price range each, five payment methods and five
//! states with their store cities.

use std::time::Duration;

use chrono::{DateTime, Local};
use rand::seq::IndexedRandom;
use rand::Rng;
use uuid::Uuid;

use crate::record::SalesRecord;

/// A product category with its products and unit price range.
#[derive(Debug, Clone, Copy)]
pub struct Category {
    /// Category name.
    pub name: &'static str,
    /// Products in the category.
    pub products: [&'static str; 5],
    /// Inclusive unit price range.
    pub price_range: (f64, f64),
}

/// Product catalogue.
pub static CATALOGUE: [Category; 10] = [
    Category {
        name: "Eletrônicos",
        products: ["Smartphone", "Notebook", "Tablet", "Smart TV", "Fones de Ouvido"],
        price_range: (500.0, 5000.0),
    },
    Category {
        name: "Roupas",
        products: ["Camisa", "Calça", "Vestido", "Casaco", "Tênis"],
        price_range: (50.0, 500.0),
    },
    Category {
        name: "Alimentos",
        products: ["Café", "Chocolate", "Pão", "Arroz", "Feijão"],
        price_range: (5.0, 100.0),
    },
    Category {
        name: "Livros",
        products: ["Romance", "Técnico", "Biografia", "Ficção", "Auto-ajuda"],
        price_range: (30.0, 200.0),
    },
    Category {
        name: "Móveis",
        products: ["Sofá", "Mesa", "Cadeira", "Armário", "Cama"],
        price_range: (300.0, 3000.0),
    },
    Category {
        name: "Esportes",
        products: ["Bola", "Raquete", "Tênis Esportivo", "Luvas", "Bicicleta"],
        price_range: (50.0, 1000.0),
    },
    Category {
        name: "Beleza",
        products: ["Perfume", "Shampoo", "Maquiagem", "Creme", "Batom"],
        price_range: (20.0, 300.0),
    },
    Category {
        name: "Brinquedos",
        products: ["Boneca", "Carrinho", "Jogo de Tabuleiro", "Quebra-cabeça", "Pelúcia"],
        price_range: (30.0, 500.0),
    },
    Category {
        name: "Ferramentas",
        products: ["Martelo", "Furadeira", "Alicate", "Serra", "Chave de Fenda"],
        price_range: (40.0, 800.0),
    },
    Category {
        name: "Jóias",
        products: ["Anel", "Colar", "Brinco", "Pulseira", "Relógio"],
        price_range: (100.0, 5000.0),
    },
];

/// Accepted payment methods.
pub static PAYMENT_METHODS: [&str; 5] = ["Crédito", "Débito", "Dinheiro", "PIX", "Boleto"];

/// States and the cities that have stores.
pub static STORE_LOCATIONS: [(&str, &[&str]); 5] = [
    ("SP", &["São Paulo", "Campinas", "Santos", "Guarulhos"]),
    ("RJ", &["Rio de Janeiro", "Niterói", "Petrópolis"]),
    ("MG", &["Belo Horizonte", "Contagem", "Juiz de Fora"]),
    ("RS", &["Porto Alegre", "Caxias do Sul", "Pelotas"]),
    ("PR", &["Curitiba", "Londrina", "Maringá"]),
];

static FIRST_NAMES: [&str; 12] = [
    "Ana", "Bruno", "Carla", "Diego", "Eduarda", "Felipe", "Gabriela", "Henrique", "Isabela",
    "Lucas", "Mariana", "Rafael",
];

static LAST_NAMES: [&str; 10] = [
    "Silva", "Santos", "Oliveira", "Souza", "Lima", "Pereira", "Costa", "Ferreira", "Almeida",
    "Ribeiro",
];

static EMAIL_DOMAINS: [&str; 3] = ["example.com", "example.org", "example.net"];

/// Minimum pause between two generated sales.
pub const MIN_INTERVAL: Duration = Duration::from_millis(500);

/// Maximum pause between two generated sales.
pub const MAX_INTERVAL: Duration = Duration::from_millis(2000);

/// Random sale factory.
#[derive(Debug)]
pub struct SaleGenerator<R> {
    rng: R,
}

impl<R: Rng> SaleGenerator<R> {
    /// Creates a generator drawing from `rng`.
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Generates one sale stamped with `now`.
    pub fn generate(&mut self, now: DateTime<Local>) -> SalesRecord {
        let first = pick(&mut self.rng, &FIRST_NAMES);
        let last = pick(&mut self.rng, &LAST_NAMES);
        let domain = pick(&mut self.rng, &EMAIL_DOMAINS);

        let category = pick(&mut self.rng, &CATALOGUE);
        let product = pick(&mut self.rng, &category.products);
        let (min_price, max_price) = category.price_range;
        let price = round_cents(self.rng.random_range(min_price..=max_price));
        let quantity: i32 = self.rng.random_range(1..=5);

        let (state, cities) = pick(&mut self.rng, &STORE_LOCATIONS);
        let city = pick(&mut self.rng, cities);
        let store_number: u8 = self.rng.random_range(1..=10);

        SalesRecord {
            id_venda: Uuid::new_v4().to_string(),
            timestamp: Some(now.timestamp_millis()),
            data_hora: Some(now.format("%Y-%m-%dT%H:%M:%S").to_string()),
            id_cliente: Some(Uuid::new_v4().to_string()),
            nome_cliente: Some(format!("{} {}", first, last)),
            email_cliente: Some(format!(
                "{}.{}@{}",
                first.to_lowercase(),
                last.to_lowercase(),
                domain
            )),
            produto: Some(product.to_string()),
            categoria: Some(category.name.to_string()),
            preco: Some(price),
            quantidade: Some(quantity),
            valor_total: round_cents(price * f64::from(quantity)),
            forma_pagamento: Some(pick(&mut self.rng, &PAYMENT_METHODS).to_string()),
            loja: Some(format!("{}-{}", city, store_number)),
            cidade: Some(city.to_string()),
            estado: Some(state.to_string()),
        }
    }

    /// Draws the pause before the next sale.
    pub fn next_interval(&mut self) -> Duration {
        let millis = self
            .rng
            .random_range(MIN_INTERVAL.as_millis() as u64..=MAX_INTERVAL.as_millis() as u64);
        Duration::from_millis(millis)
    }
}

fn pick<'a, T, R: Rng>(rng: &mut R, items: &'a [T]) -> &'a T {
    // Catalogues are non-empty constants.
    items.choose(rng).unwrap_or(&items[0])
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
